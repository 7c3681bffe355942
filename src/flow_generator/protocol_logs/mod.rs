pub mod sql;

use serde::Serialize;

/// The string every published payload starts with; consumers key on it.
pub const WIRE_PREFIX: &str = "APPS sniff ";

pub const DML_VERBS: [&str; 5] = ["select", "update", "insert", "delete", "truncate"];

/// One completed request/response pair, ready for publication.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryObservation {
    pub service_id: String,
    pub tenant_id: String,
    pub sql: String,
    /// Request-to-response latency in microseconds.
    pub time: f64,
    /// Request body length in bytes.
    pub size: u64,
    /// Leading verb of `sql`.
    pub operate: String,
}

impl QueryObservation {
    pub fn to_wire(&self) -> String {
        // serialization of a string/number struct cannot fail
        format!("{}{}", WIRE_PREFIX, serde_json::to_string(self).unwrap())
    }
}

/// Lowercased first token of a statement, asterisks stripped, used as the
/// observation's operation label.
pub fn operate_of(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|&c| c != '*')
        .collect::<String>()
        .to_lowercase()
}

/// True when the rendered fingerprint contains any DML verb. This is a
/// substring match over the whole text, so identifiers like `selectors`
/// match too.
pub fn matches_dml(fingerprint_lower: &str) -> bool {
    DML_VERBS.iter().any(|verb| fingerprint_lower.contains(verb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operate_extraction() {
        assert_eq!(operate_of("SELECT a FROM t"), "select");
        assert_eq!(operate_of("  UPDATE t SET a=?"), "update");
        assert_eq!(operate_of("select*from t"), "selectfrom");
        assert_eq!(operate_of(""), "");
    }

    #[test]
    fn dml_filter_is_substring() {
        assert!(matches_dml("select a from t"));
        assert!(matches_dml("show selectors"));
        assert!(!matches_dml("show tables"));
        assert!(matches_dml("truncate t"));
    }

    #[test]
    fn wire_form_carries_prefix_and_json() {
        let observation = QueryObservation {
            service_id: "svc".into(),
            tenant_id: "acme".into(),
            sql: "SELECT ?".into(),
            time: 512.25,
            size: 8,
            operate: "select".into(),
        };
        let wire = observation.to_wire();
        assert!(wire.starts_with(WIRE_PREFIX));
        let json: serde_json::Value = serde_json::from_str(&wire[WIRE_PREFIX.len()..]).unwrap();
        assert_eq!(json["operate"], "select");
        assert_eq!(json["size"], 8);
        assert_eq!(json["time"], 512.25);
    }
}
