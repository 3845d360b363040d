//! Per-request parameters handed to handlers.

use std::collections::HashMap;

/// Parameters bound from path placeholders, e.g. `{name}`.
pub type NamedParams = HashMap<String, String>;

/// Form parameters: each key maps to its values in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    values: HashMap<String, Vec<String>>,
}

impl FormParams {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// All values for `key`, if the key was sent at all.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// Whether `key` was sent.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// First value for `key`, or the empty string.
    pub fn string(&self, key: &str) -> String {
        self.get(key)
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_default()
    }

    /// All values for `key`, or an empty list.
    pub fn string_slice(&self, key: &str) -> Vec<String> {
        self.get(key).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// First value for `key` as an integer, or 0 when absent or malformed.
    pub fn int(&self, key: &str) -> i64 {
        self.get(key)
            .and_then(|values| values.first())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }

    /// Whether the first value for `key` is exactly `"true"`.
    pub fn bool(&self, key: &str) -> bool {
        self.get(key)
            .and_then(|values| values.first())
            .is_some_and(|value| value == "true")
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key was sent.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FormParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = Self::new();
        for (key, value) in iter {
            form.append(key, value);
        }
        form
    }
}

/// Everything a handler may read about one request.
///
/// Both transports build the same shape: HTTP from route variables and the
/// parsed body, SSH from positional tokens bound to the operation's
/// placeholders.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Values bound from path placeholders.
    pub named: NamedParams,
    /// Form fields.
    pub form: FormParams,
}

impl RequestContext {
    /// Build a context from already-extracted parts.
    pub fn new(named: NamedParams, form: FormParams) -> Self {
        Self { named, form }
    }

    /// Bind positional command-line arguments to `placeholders`.
    ///
    /// Arguments are bound to placeholders in order. Leftover tokens are read
    /// as form fields: `--key=value`, `--key value`, or a bare `--flag`
    /// meaning `"true"`. Any other leftover token is appended to `args`.
    pub fn from_args(placeholders: &[String], args: &[String]) -> Self {
        let mut named = NamedParams::new();
        let mut rest = args.iter().peekable();
        for placeholder in placeholders {
            match rest.next() {
                Some(value) => {
                    named.insert(placeholder.clone(), value.clone());
                }
                None => break,
            }
        }

        let mut form = FormParams::new();
        while let Some(token) = rest.next() {
            let Some(flag) = token.strip_prefix("--").filter(|flag| !flag.is_empty()) else {
                form.append("args", token.as_str());
                continue;
            };
            if let Some((key, value)) = flag.split_once('=') {
                form.append(key, value);
                continue;
            }
            match rest.next_if(|next| !next.starts_with("--")) {
                Some(value) => form.append(flag, value.as_str()),
                None => form.append(flag, "true"),
            }
        }

        Self { named, form }
    }

    /// The bound machine name, if any.
    pub fn name(&self) -> Option<&str> {
        self.named.get("name").map(String::as_str)
    }
}
