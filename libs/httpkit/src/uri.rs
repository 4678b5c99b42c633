use crate::params::{KeyValueList, ParamValue};

/// Request target: a location plus query parameters.
///
/// The URL is assembled on demand and never cached, so [`Uri::url`] always
/// reflects the current location and parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    location: String,
    params: KeyValueList,
}

impl Uri {
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            params: KeyValueList::new(),
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    /// Builder-style variant of [`add_query_param`](Self::add_query_param).
    #[must_use]
    pub fn with_query_param<V: ParamValue + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &V,
    ) -> Self {
        self.add_query_param(key, value);
        self
    }

    pub fn add_query_param<V: ParamValue + ?Sized>(&mut self, key: impl Into<String>, value: &V) {
        self.params.add_key_value(key, value);
    }

    #[must_use]
    pub fn params(&self) -> &KeyValueList {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut KeyValueList {
        &mut self.params
    }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query_param(&self) -> String {
        self.params.join()
    }

    /// Location followed by `?query` when there is at least one parameter.
    #[must_use]
    pub fn url(&self) -> String {
        let query = self.query_param();
        if query.is_empty() {
            self.location.clone()
        } else {
            format!("{}?{query}", self.location)
        }
    }
}

impl From<&str> for Uri {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

impl From<String> for Uri {
    fn from(location: String) -> Self {
        Self::new(location)
    }
}
