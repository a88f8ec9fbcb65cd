// Run with `cargo test -p mixly-internal --features e2e_tests` against a live Redis.
// The URL comes from `MIXLY_REDIS_URL`, defaulting to a local server.
mod redis_store;
