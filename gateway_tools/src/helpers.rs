use checkout_common::Money;

use crate::ProcessorApiError;

/// Form-encoded request parameters, in the bracketed style the processor expects for nested objects
/// (`transfer_data[destination]=acct_123`).
///
/// Parameters keep their insertion order, which makes request bodies deterministic and easy to assert on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    params: Vec<(String, String)>,
}

impl FormParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<V: ToString>(mut self, key: &str, value: V) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn push_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    /// Adds `parent[child]=value`.
    pub fn push_nested<V: ToString>(self, parent: &str, child: &str, value: V) -> Self {
        let key = format!("{parent}[{child}]");
        self.push(&key, value)
    }

    /// Adds a monetary amount. The processor only accepts non-negative integer minor units.
    pub fn push_amount(self, key: &str, amount: Money) -> Result<Self, ProcessorApiError> {
        let value = amount
            .to_unsigned()
            .map_err(|e| ProcessorApiError::InvalidParameters(format!("Invalid amount for {key}. {e}")))?;
        Ok(self.push(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.params
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_parameters() {
        let params = FormParams::new()
            .push("amount", 1000)
            .push_nested("transfer_data", "destination", "acct_1")
            .push_opt::<String>("description", None);
        assert_eq!(params.get("transfer_data[destination]"), Some("acct_1"));
        assert_eq!(params.get("amount"), Some("1000"));
        assert!(!params.contains("description"));
        assert_eq!(params.as_slice().len(), 2);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let err = FormParams::new().push_amount("amount", Money::from(-5)).unwrap_err();
        assert!(matches!(err, ProcessorApiError::InvalidParameters(_)));
        let ok = FormParams::new().push_amount("amount", Money::from(850)).unwrap();
        assert_eq!(ok.get("amount"), Some("850"));
    }
}
