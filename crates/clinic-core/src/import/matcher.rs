//! Matching imported rows against existing inventory.

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::models::InventoryItem;

/// Similarity at or above which a name is treated as the same item.
pub const FUZZY_THRESHOLD: f64 = 0.92;

/// How an imported row relates to existing inventory.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemMatch {
    Barcode(String),
    ExactName(String),
    Fuzzy { item_id: String, score: f64 },
    None,
}

/// Lowercase with whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumerics only, so "Panadol 500 mg" equals "panadol 500mg".
pub fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Digit runs in a name ("Amoxil 250mg/5ml" → ["250", "5"]).
fn numbers(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Combined Jaro-Winkler / Levenshtein similarity in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    let jw = jaro_winkler(&a, &b);
    let lev = normalized_levenshtein(&a, &b);

    // Jaro-Winkler favours shared prefixes, which drug names usually have
    jw * 0.6 + lev * 0.4
}

/// Finds the inventory item an imported row refers to.
pub struct Matcher<'a> {
    items: &'a [InventoryItem],
    threshold: f64,
}

impl<'a> Matcher<'a> {
    pub fn new(items: &'a [InventoryItem]) -> Self {
        Self {
            items,
            threshold: FUZZY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Barcode first, then exact name, then the best fuzzy name.
    ///
    /// Fuzzy candidates must carry the same numbers as the row, so
    /// "Panadol 250mg" never matches "Panadol 500mg".
    pub fn find(&self, name: &str, barcode: Option<&str>) -> ItemMatch {
        if let Some(barcode) = barcode {
            if let Some(item) = self
                .items
                .iter()
                .find(|i| i.barcode.as_deref() == Some(barcode))
            {
                return ItemMatch::Barcode(item.id.clone());
            }
        }

        let key = name_key(name);
        if let Some(item) = self.items.iter().find(|i| name_key(&i.name) == key) {
            return ItemMatch::ExactName(item.id.clone());
        }

        let wanted = numbers(name);
        let mut best: Option<(&InventoryItem, f64)> = None;
        for item in self.items {
            if numbers(&item.name) != wanted {
                continue;
            }
            let score = similarity(name, &item.name);
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((item, score));
            }
        }

        match best {
            Some((item, score)) => ItemMatch::Fuzzy {
                item_id: item.id.clone(),
                score,
            },
            None => ItemMatch::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, barcode: Option<&str>) -> InventoryItem {
        let mut item = InventoryItem::new(name.into(), 1.0, "USD".into());
        item.barcode = barcode.map(String::from);
        item
    }

    fn inventory() -> Vec<InventoryItem> {
        vec![
            item("Amoxicillin 500mg", Some("6221234567890")),
            item("Panadol 500mg", None),
            item("Ibuprofen 400mg", None),
        ]
    }

    #[test]
    fn test_name_key() {
        assert_eq!(name_key("Panadol  500 MG"), "panadol500mg");
        assert_eq!(normalize_name("  Panadol   Extra "), "panadol extra");
    }

    #[test]
    fn test_barcode_wins() {
        let items = inventory();
        let found = Matcher::new(&items).find("Something else", Some("6221234567890"));
        assert_eq!(found, ItemMatch::Barcode(items[0].id.clone()));
    }

    #[test]
    fn test_exact_name_ignores_case_and_spacing() {
        let items = inventory();
        let found = Matcher::new(&items).find("PANADOL 500 mg", None);
        assert_eq!(found, ItemMatch::ExactName(items[1].id.clone()));
    }

    #[test]
    fn test_fuzzy_typo() {
        let items = inventory();
        match Matcher::new(&items).find("Amoxicilin 500mg", None) {
            ItemMatch::Fuzzy { item_id, score } => {
                assert_eq!(item_id, items[0].id);
                assert!(score >= FUZZY_THRESHOLD);
            }
            other => panic!("expected fuzzy match, got {:?}", other),
        }
    }

    #[test]
    fn test_different_strength_never_fuzzy() {
        let items = inventory();
        assert_eq!(
            Matcher::new(&items).find("Panadol 250mg", None),
            ItemMatch::None
        );
    }

    #[test]
    fn test_unrelated_name() {
        let items = inventory();
        assert_eq!(
            Matcher::new(&items).find("Cetirizine 10mg", None),
            ItemMatch::None
        );
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("Panadol", "panadol"), 1.0);
        assert!(similarity("Panadol", "Zyrtec") < 0.6);
    }
}
