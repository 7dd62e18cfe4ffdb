//! Layered env templating.
//!
//! Three layers are composed in order: system facts, global settings,
//! per-container settings. Each layer is immutable; deriving a new layer
//! copies the substitution table and applies the overrides on top.

use std::collections::HashMap;

use paddock_common::{HostFacts, PaddockError, PaddockResult};

/// An ordered, immutable `$$KEY$$` substitution table.
#[derive(Debug, Clone, Default)]
pub struct EnvTemplate {
    /// `("$$KEY$$", value)` pairs in definition order.
    subs: Vec<(String, String)>,
}

fn token(key: &str) -> String {
    format!("$${key}$$")
}

impl EnvTemplate {
    /// The system layer, derived from the executing host.
    ///
    /// Defines `HOST_NAME`, `HOST_PRETTY_NAME` and `HOST_IP`.
    #[must_use]
    pub fn system(facts: &HostFacts) -> Self {
        Self {
            subs: vec![
                (token("HOST_NAME"), facts.host_name.clone()),
                (token("HOST_PRETTY_NAME"), facts.pretty_name.clone()),
                (token("HOST_IP"), facts.address.to_string()),
            ],
        }
    }

    /// Derive a new layer with `values` applied in the order given by `order`.
    ///
    /// The two inputs must describe the same key set; a length mismatch is a
    /// configuration-integrity defect and reported as an internal error. A
    /// key redefining an earlier layer keeps its original position.
    pub fn overridden(
        &self,
        values: &HashMap<String, String>,
        order: &[String],
    ) -> PaddockResult<Self> {
        if values.len() != order.len() {
            return Err(PaddockError::internal(format!(
                "env override integrity breach: {} values but {} ordered keys",
                values.len(),
                order.len()
            )));
        }

        let mut subs = self.subs.clone();
        for key in order {
            let value = values.get(key).ok_or_else(|| {
                PaddockError::internal(format!(
                    "env override integrity breach: ordered key \"{key}\" missing from value map"
                ))
            })?;
            let token = token(key);
            match subs.iter_mut().find(|(t, _)| *t == token) {
                Some(entry) => entry.1 = value.clone(),
                None => subs.push((token, value.clone())),
            }
        }

        Ok(Self { subs })
    }

    /// Derive a new layer from ordered key/value pairs.
    pub fn overridden_pairs(&self, pairs: &[(String, String)]) -> PaddockResult<Self> {
        let mut values = HashMap::with_capacity(pairs.len());
        let mut order = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            if values.insert(key.clone(), value.clone()).is_none() {
                order.push(key.clone());
            }
        }
        self.overridden(&values, &order)
    }

    /// Substitute all known tokens in `input`.
    ///
    /// This is a single left-to-right pass: at each position the first
    /// matching token in table order is replaced, and the substituted value
    /// is never rescanned for further tokens.
    #[must_use]
    pub fn apply(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        'scan: while !rest.is_empty() {
            if rest.starts_with("$$") {
                for (token, value) in &self.subs {
                    if rest.starts_with(token.as_str()) {
                        out.push_str(value);
                        rest = &rest[token.len()..];
                        continue 'scan;
                    }
                }
            }
            if let Some(ch) = rest.chars().next() {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn facts() -> HostFacts {
        HostFacts {
            host_name: "node1.lan".to_string(),
            pretty_name: "node1".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        }
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn system_layer_substitutes_host_facts() {
        let tpl = EnvTemplate::system(&facts());
        assert_eq!(tpl.apply("db.$$HOST_NAME$$"), "db.node1.lan");
        assert_eq!(tpl.apply("$$HOST_IP$$:5432"), "192.168.1.10:5432");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let tpl = EnvTemplate::system(&facts());
        assert_eq!(tpl.apply("$$UNSET$$/x"), "$$UNSET$$/x");
    }

    #[test]
    fn later_layer_overrides_keep_position() {
        let base = EnvTemplate::default()
            .overridden_pairs(&pairs(&[("A", "1"), ("B", "2")]))
            .unwrap();
        let derived = base
            .overridden_pairs(&pairs(&[("C", "3"), ("A", "override")]))
            .unwrap();

        // A keeps its first-definition slot, C is appended.
        assert_eq!(derived.apply("$$A$$ $$B$$ $$C$$"), "override 2 3");
    }

    #[test]
    fn apply_is_a_single_pass() {
        // The substituted value contains another token; it must not expand.
        let tpl = EnvTemplate::default()
            .overridden_pairs(&pairs(&[("OUTER", "$$INNER$$"), ("INNER", "leaked")]))
            .unwrap();
        assert_eq!(tpl.apply("$$OUTER$$"), "$$INNER$$");
    }

    #[test]
    fn earlier_table_entry_wins_at_same_position() {
        let tpl = EnvTemplate::default()
            .overridden_pairs(&pairs(&[("AB", "first"), ("ABC", "second")]))
            .unwrap();
        // "$$AB$$" matches before "$$ABC$$" could be considered.
        assert_eq!(tpl.apply("$$AB$$C$$"), "firstC$$");
    }

    #[test]
    fn mismatched_override_lengths_are_fatal() {
        let mut values = HashMap::new();
        values.insert("A".to_string(), "1".to_string());
        values.insert("B".to_string(), "2".to_string());
        let order = vec!["A".to_string()];

        let err = EnvTemplate::default()
            .overridden(&values, &order)
            .unwrap_err();
        assert!(matches!(err, PaddockError::Internal { .. }));
    }
}
