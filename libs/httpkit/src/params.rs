//! Ordered key/value pairs shared by the query-string and url-encoded body builders.
//!
//! Values are stored as strings. Typed values are converted once, at insertion
//! time, through [`ParamValue`].

/// Fractional digits used for floats added without an explicit precision.
pub const DEFAULT_FLOAT_PRECISION: usize = 3;

/// How a boolean is rendered when inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolStyle {
    /// `true` / `false`
    #[default]
    Word,
    /// `1` / `0`
    Digit,
}

impl BoolStyle {
    #[must_use]
    pub const fn render(self, value: bool) -> &'static str {
        match (self, value) {
            (Self::Word, true) => "true",
            (Self::Word, false) => "false",
            (Self::Digit, true) => "1",
            (Self::Digit, false) => "0",
        }
    }
}

/// A value that can be stored in a [`KeyValueList`].
pub trait ParamValue {
    /// Canonical string form of the value.
    fn to_param(&self) -> String;
}

impl ParamValue for str {
    fn to_param(&self) -> String {
        self.to_owned()
    }
}

impl ParamValue for String {
    fn to_param(&self) -> String {
        self.clone()
    }
}

impl<T: ParamValue + ?Sized> ParamValue for &T {
    fn to_param(&self) -> String {
        (**self).to_param()
    }
}

impl ParamValue for bool {
    fn to_param(&self) -> String {
        BoolStyle::Word.render(*self).to_owned()
    }
}

macro_rules! integer_param {
    ($($t:ty),*) => {
        $(impl ParamValue for $t {
            fn to_param(&self) -> String {
                self.to_string()
            }
        })*
    };
}

integer_param!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl ParamValue for f64 {
    fn to_param(&self) -> String {
        format_float(*self, DEFAULT_FLOAT_PRECISION)
    }
}

impl ParamValue for f32 {
    fn to_param(&self) -> String {
        format_float(f64::from(*self), DEFAULT_FLOAT_PRECISION)
    }
}

/// Render `value` with `precision` fractional digits, then drop the
/// redundant tail.
///
/// Trailing zeros are removed from the fractional part only, followed by a
/// dangling `.`. Integer digits are never touched and the result is never
/// empty: `1.50 -> "1.5"`, `2.00 -> "2"`, `100.0 -> "100"`, `0.0 -> "0"`.
/// A value that rounds to negative zero is written as `"0"`.
#[must_use]
pub fn format_float(value: f64, precision: usize) -> String {
    let mut text = format!("{value:.precision$}");
    if !value.is_finite() {
        return text;
    }
    if text.contains('.') {
        let kept = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(kept);
    }
    if text == "-0" {
        text.remove(0);
    }
    text
}

/// One stored pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueParam {
    pub key: String,
    pub value: String,
}

/// Insertion-ordered list of string pairs. Duplicate keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueList {
    params: Vec<KeyValueParam>,
}

impl KeyValueList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair.
    pub fn add_key_value<V: ParamValue + ?Sized>(&mut self, key: impl Into<String>, value: &V) {
        self.push(key.into(), value.to_param());
    }

    /// Append a boolean using the given rendering.
    pub fn add_bool_as(&mut self, key: impl Into<String>, value: bool, style: BoolStyle) {
        self.push(key.into(), style.render(value).to_owned());
    }

    /// Append a boolean as `true` / `false`.
    pub fn add_bool(&mut self, key: impl Into<String>, value: bool) {
        self.add_bool_as(key, value, BoolStyle::Word);
    }

    /// Append a float with an explicit number of fractional digits.
    pub fn add_float(&mut self, key: impl Into<String>, value: f64, precision: usize) {
        self.push(key.into(), format_float(value, precision));
    }

    fn push(&mut self, key: String, value: String) {
        self.params.push(KeyValueParam { key, value });
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValueParam> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// `k1=v1&k2=v2...` in insertion order. Nothing is escaped.
    #[must_use]
    pub fn join(&self) -> String {
        self.join_with(|s| s.to_owned())
    }

    /// Same as [`join`](Self::join), but passes keys and values through `encode`.
    pub(crate) fn join_with(&self, encode: impl Fn(&str) -> String) -> String {
        let mut out = String::new();
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(&encode(&p.key));
            out.push('=');
            out.push_str(&encode(&p.value));
        }
        out
    }
}

impl<'a> IntoIterator for &'a KeyValueList {
    type Item = &'a KeyValueParam;
    type IntoIter = std::slice::Iter<'a, KeyValueParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_join_keeps_insertion_order() {
        let mut list = KeyValueList::new();
        list.add_key_value("a", "1");
        list.add_key_value("b", "2");
        assert_eq!(list.join(), "a=1&b=2");
    }

    #[test]
    fn test_join_empty_and_single() {
        let mut list = KeyValueList::new();
        assert_eq!(list.join(), "");
        list.add_key_value("only", "x");
        assert_eq!(list.join(), "only=x");
    }

    #[test]
    fn test_values_are_not_escaped() {
        let mut list = KeyValueList::new();
        list.add_key_value("q", "a b&c");
        assert_eq!(list.join(), "q=a b&c");
    }

    #[test]
    fn test_duplicate_keys_are_kept() {
        let mut list = KeyValueList::new();
        list.add_key_value("k", "1");
        list.add_key_value("k", "2");
        assert_eq!(list.join(), "k=1&k=2");
        assert_eq!(list.get("k"), Some("1"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_bool_styles() {
        let mut list = KeyValueList::new();
        list.add_bool("w", true);
        list.add_bool_as("d", false, BoolStyle::Digit);
        list.add_key_value("v", &false);
        assert_eq!(list.join(), "w=true&d=0&v=false");
    }

    #[test]
    fn test_integers_are_never_trimmed() {
        let mut list = KeyValueList::new();
        list.add_key_value("a", &100);
        list.add_key_value("b", &0u8);
        list.add_key_value("c", &-20i64);
        assert_eq!(list.join(), "a=100&b=0&c=-20");
    }

    #[test]
    fn test_float_trimming_rule() {
        assert_eq!(format_float(1.50, 2), "1.5");
        assert_eq!(format_float(2.00, 2), "2");
        assert_eq!(format_float(100.0, 2), "100");
        assert_eq!(format_float(0.5, 3), "0.5");
        assert_eq!(format_float(0.0, 3), "0");
        assert_eq!(format_float(-0.0001, 2), "0");
        assert_eq!(format_float(-1.25, 3), "-1.25");
        assert_eq!(format_float(3.14159, 2), "3.14");
        assert_eq!(format_float(7.0, 0), "7");
    }

    #[test]
    fn test_float_default_precision() {
        let mut list = KeyValueList::new();
        list.add_key_value("f", &1.23456_f64);
        list.add_key_value("g", &2.5_f32);
        list.add_float("h", 10.10, 2);
        assert_eq!(list.join(), "f=1.235&g=2.5&h=10.1");
    }

    #[test]
    fn test_non_finite_floats_pass_through() {
        assert_eq!(format_float(f64::NAN, 2), "NaN");
        assert_eq!(format_float(f64::INFINITY, 2), "inf");
    }

    #[test]
    fn test_clear() {
        let mut list = KeyValueList::new();
        list.add_key_value("a", "1");
        list.clear();
        assert!(list.is_empty());
    }
}
