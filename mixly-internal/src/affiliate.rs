use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

const MAX_LINKS: usize = 3;

const TOTAL_WINE_SEARCH_URL: &str = "https://totalwine.com/search/all";
const TOTAL_WINE_PARTNER_ID: &str = "mixly";
const AMAZON_SEARCH_URL: &str = "https://amazon.com/s";
const AMAZON_ASSOCIATE_TAG: &str = "mixly-20";

#[expect(clippy::expect_used)]
static LEADING_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\d+(\.\d+)?\s?(oz|ounces?|cups?|tsp|teaspoons?|tbsp|tablespoons?|ml|dash(es)?|splash(es)?|drops?)\s+(of\s+)?",
    )
    .expect("Failed to compile LEADING_QUANTITY regex")
});

#[expect(clippy::expect_used)]
static LEADING_MEASURE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(a\s+)?(splash\s+of\s+|dash\s+of\s+|few\s+drops\s+of\s+)")
        .expect("Failed to compile LEADING_MEASURE_PHRASE regex")
});

#[expect(clippy::expect_used)]
static LEADING_FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+\s+)?\d+/\d+\s+(oz|cups?|tsp|tbsp)\s+(of\s+)?")
        .expect("Failed to compile LEADING_FRACTION regex")
});

#[expect(clippy::expect_used)]
static SPIRIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(vodka|whiske?y|rum|gin|tequila|brandy|bourbon|scotch)\b")
        .expect("Failed to compile SPIRIT regex")
});

#[expect(clippy::expect_used)]
static EQUIPMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(shaker|glass|strainer|jigger|muddler)(e?s)?\b")
        .expect("Failed to compile EQUIPMENT regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AffiliateLinkType {
    Liquor,
    Ingredient,
    Equipment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffiliateLink {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub link_type: AffiliateLinkType,
}

/// Strips leading measurements such as "2 oz", "3/4 oz" or "dash of".
/// Falls back to the original text when nothing would be left.
pub fn clean_ingredient_name(ingredient: &str) -> String {
    let cleaned = LEADING_QUANTITY.replace(ingredient, "");
    let cleaned = LEADING_MEASURE_PHRASE.replace(&cleaned, "");
    let cleaned = LEADING_FRACTION.replace(&cleaned, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        ingredient.to_string()
    } else {
        cleaned.to_string()
    }
}

fn search_url(base: &str, params: &[(&str, &str)]) -> Option<String> {
    match Url::parse_with_params(base, params) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!("Failed to build affiliate URL from `{base}`: {e}");
            None
        }
    }
}

fn link_for(ingredient: &str) -> Option<AffiliateLink> {
    let name = clean_ingredient_name(ingredient);
    let total_wine = |name: &str| {
        search_url(
            TOTAL_WINE_SEARCH_URL,
            &[("text", name), ("utm_source", TOTAL_WINE_PARTNER_ID)],
        )
    };

    if SPIRIT.is_match(&name) {
        Some(AffiliateLink {
            url: total_wine(&name)?,
            name: format!("Order {name}"),
            link_type: AffiliateLinkType::Liquor,
        })
    } else if EQUIPMENT.is_match(&name) {
        Some(AffiliateLink {
            url: search_url(
                AMAZON_SEARCH_URL,
                &[("k", name.as_str()), ("tag", AMAZON_ASSOCIATE_TAG)],
            )?,
            name: format!("Buy {name}"),
            link_type: AffiliateLinkType::Equipment,
        })
    } else if name.chars().count() > 2 {
        Some(AffiliateLink {
            url: total_wine(&name)?,
            name: format!("Find {name}"),
            link_type: AffiliateLinkType::Ingredient,
        })
    } else {
        None
    }
}

/// Shopping links for a suggestion's ingredients, de-duplicated by name, at most three.
pub fn generate_affiliate_links(ingredients: &[String]) -> Vec<AffiliateLink> {
    let mut seen = HashSet::new();
    ingredients
        .iter()
        .filter_map(|ingredient| link_for(ingredient))
        .filter(|link| seen.insert(link.name.clone()))
        .take(MAX_LINKS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_ingredient_name() {
        assert_eq!(clean_ingredient_name("2 oz Bourbon"), "Bourbon");
        assert_eq!(clean_ingredient_name("1.5oz gin"), "gin");
        assert_eq!(clean_ingredient_name("3/4 oz lemon juice"), "lemon juice");
        assert_eq!(clean_ingredient_name("1 1/2 oz dark rum"), "dark rum");
        assert_eq!(clean_ingredient_name("2 dashes Angostura bitters"), "Angostura bitters");
        assert_eq!(clean_ingredient_name("Splash of soda water"), "soda water");
        assert_eq!(clean_ingredient_name("a dash of salt"), "salt");
        assert_eq!(clean_ingredient_name("few drops of saline"), "saline");
        assert_eq!(clean_ingredient_name("1 cup of ice"), "ice");
        assert_eq!(clean_ingredient_name("Mint leaves"), "Mint leaves");
    }

    #[test]
    fn test_links_by_kind() {
        let links = generate_affiliate_links(&[
            "2 oz Bourbon".to_string(),
            "Cocktail shaker".to_string(),
            "3/4 oz lemon juice".to_string(),
        ]);
        assert_eq!(
            links,
            vec![
                AffiliateLink {
                    name: "Order Bourbon".to_string(),
                    url: "https://totalwine.com/search/all?text=Bourbon&utm_source=mixly"
                        .to_string(),
                    link_type: AffiliateLinkType::Liquor,
                },
                AffiliateLink {
                    name: "Buy Cocktail shaker".to_string(),
                    url: "https://amazon.com/s?k=Cocktail+shaker&tag=mixly-20".to_string(),
                    link_type: AffiliateLinkType::Equipment,
                },
                AffiliateLink {
                    name: "Find lemon juice".to_string(),
                    url: "https://totalwine.com/search/all?text=lemon+juice&utm_source=mixly"
                        .to_string(),
                    link_type: AffiliateLinkType::Ingredient,
                },
            ]
        );
    }

    #[test]
    fn test_spirit_match_is_word_based() {
        let links = generate_affiliate_links(&["4 oz ginger beer".to_string()]);
        assert_eq!(links[0].name, "Find ginger beer");
        assert_eq!(links[0].link_type, AffiliateLinkType::Ingredient);
    }

    #[test]
    fn test_dedup_short_names_and_cap() {
        let links = generate_affiliate_links(&[
            "2 oz gin".to_string(),
            "1 oz gin".to_string(),
            "Ice".to_string(),
            "OJ".to_string(),
            "Simple syrup".to_string(),
            "Club soda".to_string(),
            "Lime".to_string(),
        ]);
        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Order gin", "Find Ice", "Find Simple syrup"]);
    }

    #[test]
    fn test_link_serializes_type_field() {
        let links = generate_affiliate_links(&["Highball glass".to_string()]);
        let json = serde_json::to_value(&links[0]).unwrap();
        assert_eq!(json["type"], "equipment");
        assert_eq!(json["name"], "Buy Highball glass");
    }
}
