//! Identifier types for portfolio entities.
//!
//! Strongly-typed identifiers for trades, counterparties and netting sets.
//! Netting set ids order lexicographically so that per-netting-set maps
//! iterate deterministically.

use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Unique identifier for a trade.
    ///
    /// # Examples
    ///
    /// ```
    /// use xva_aggregation::portfolio::TradeId;
    ///
    /// let id = TradeId::new("SWAP_001");
    /// assert_eq!(id.as_str(), "SWAP_001");
    /// ```
    TradeId
}

string_id! {
    /// Unique identifier for a counterparty.
    CounterpartyId
}

string_id! {
    /// Unique identifier for a netting set.
    NettingSetId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet};

    #[test]
    fn test_trade_id_from_str_and_string() {
        let a: TradeId = "T1".into();
        let b: TradeId = String::from("T1").into();
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "T1");
    }

    #[test]
    fn test_trade_id_hash() {
        let mut set = HashSet::new();
        set.insert(TradeId::new("T1"));
        set.insert(TradeId::new("T2"));
        set.insert(TradeId::new("T1"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(NettingSetId::new("NS1"), 7usize);
        assert_eq!(map.get("NS1"), Some(&7));
    }

    #[test]
    fn test_netting_set_ids_sort_lexicographically() {
        let mut map = BTreeMap::new();
        map.insert(NettingSetId::new("NS_B"), ());
        map.insert(NettingSetId::new("NS_A"), ());
        let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["NS_A", "NS_B"]);
    }

    #[test]
    fn test_default_counterparty_is_empty() {
        assert_eq!(CounterpartyId::default().as_str(), "");
    }
}
