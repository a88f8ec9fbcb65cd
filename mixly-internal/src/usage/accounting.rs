use tracing::{debug, error, warn};

use super::entitlement::Admission;
use super::record::UsageRecordUpdate;
use super::UsageMeter;
use crate::error::ErrorDetails;

impl UsageMeter {
    /// Charges one unit for a delivered suggestion and releases the admission's reservation.
    ///
    /// Never creates a record and never fails the caller: a missing record or an
    /// unreachable store is logged and the charge is skipped.
    pub async fn record_consumption(&self, admission: Admission) {
        let (owned_uid, reason, reservation) = admission.into_parts();
        let uid = owned_uid.as_str();
        let _guard = self.locks.acquire(uid).await;

        let charged = match self.store.get(uid).await {
            Ok(Some(record)) => {
                self.store
                    .update(
                        uid,
                        UsageRecordUpdate {
                            request_count: Some(record.request_count.saturating_add(1)),
                            ..Default::default()
                        },
                    )
                    .await
            }
            Ok(None) => {
                debug!(uid, %reason, "No usage record to charge, skipping");
                self.metrics.record_consumption_skipped();
                if let Some(reservation) = reservation {
                    reservation.release();
                }
                return;
            }
            Err(e) => Err(e),
        };

        match charged {
            Ok(record) => {
                debug!(
                    uid,
                    %reason,
                    request_count = record.request_count,
                    "Recorded suggestion consumption"
                );
                self.metrics.record_consumption();
            }
            Err(e) => {
                if let ErrorDetails::UsageRecordNotFound { .. } = e.get_details() {
                    // The record existed a moment ago under the same lock
                    error!(uid, "Usage record vanished while recording consumption");
                } else {
                    warn!(uid, reason = "storage_unavailable", "Failed to record consumption: {e}");
                }
                self.metrics.record_consumption_skipped();
            }
        }

        // Released under the uid lock so the charge and the release are seen together
        if let Some(reservation) = reservation {
            reservation.release();
        }
    }
}
