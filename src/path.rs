//! Path templates, URI joining and query-string merging.
//!
//! Generated endpoints describe their path either as a literal or as a
//! template with `%N$s` placeholders filled from positional segments. The
//! rendered path is then joined onto the client's base URL together with the
//! query parameters of every layer that contributed some.

use crate::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use url::Url;

/// Everything except RFC 3986 unreserved characters.
pub(crate) const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes `input` per RFC 3986.
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, RFC3986).to_string()
}

/// A request path, either literal or templated.
///
/// # Examples
///
/// ```
/// use restcore::path::PathSpec;
///
/// let path = PathSpec::template("/buckets/%1$s/objects/%2$s", ["my bucket", "a/b"]);
/// assert_eq!(path.render().unwrap(), "/buckets/my%20bucket/objects/a%2Fb");
///
/// let path = PathSpec::from("/buckets");
/// assert_eq!(path.render().unwrap(), "/buckets");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    /// A path used as-is.
    Literal(String),
    /// A template whose placeholders are filled from encoded segments.
    Template {
        /// The template, e.g. `/v1/stores/%1$s`
        template: String,
        /// Raw segment values, encoded at render time
        segments: Vec<String>,
    },
}

impl PathSpec {
    /// Creates a templated path.
    pub fn template<I, S>(template: impl Into<String>, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        PathSpec::Template {
            template: template.into(),
            segments: segments.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Renders the path, percent-encoding every substituted segment.
    ///
    /// Supports `%N$s` (1-based positional), bare `%s` (next segment) and `%%`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a placeholder references a segment
    /// that was not supplied.
    pub fn render(&self) -> Result<String> {
        match self {
            PathSpec::Literal(path) => Ok(path.clone()),
            PathSpec::Template { template, segments } => render_template(template, segments),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::Literal(path.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(path: String) -> Self {
        PathSpec::Literal(path)
    }
}

fn render_template(template: &str, segments: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }
        if let Some(tail) = after.strip_prefix('s') {
            out.push_str(&segment(segments, next, template)?);
            next += 1;
            rest = tail;
            continue;
        }

        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        match after[digits..].strip_prefix("$s") {
            Some(tail) if digits > 0 => {
                let index: usize = after[..digits].parse().map_err(|_| {
                    Error::Configuration(format!("Invalid placeholder in path {template:?}"))
                })?;
                if index == 0 {
                    return Err(Error::Configuration(format!(
                        "Path placeholders are 1-based in {template:?}"
                    )));
                }
                out.push_str(&segment(segments, index - 1, template)?);
                rest = tail;
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn segment(segments: &[String], index: usize, template: &str) -> Result<String> {
    segments
        .get(index)
        .map(|s| encode_component(s))
        .ok_or_else(|| {
            Error::Configuration(format!(
                "Path {template:?} references segment {} but only {} were given",
                index + 1,
                segments.len()
            ))
        })
}

/// Joins `path` onto `base` and merges query parameters.
///
/// An absolute `path` (one carrying a scheme or authority) overrides the
/// base's scheme, host, port and userinfo. A path starting with `/` replaces
/// the base path; any other relative path is appended to the base path with a
/// single `/` between them. Queries from the base, from the path and from
/// `query` are always merged with [`merge_query`] in that order.
///
/// # Examples
///
/// ```
/// use restcore::path::join_uri;
/// use serde_json::json;
/// use url::Url;
///
/// let base = Url::parse("https://api.example.com/v1?tenant=a").unwrap();
/// let query = json!({"limit": 10}).as_object().unwrap().clone();
///
/// let url = join_uri(&base, "buckets?sort=name", &query).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://api.example.com/v1/buckets?tenant=a&sort=name&limit=10"
/// );
/// ```
pub fn join_uri(base: &Url, path: &str, query: &Map<String, Value>) -> Result<Url> {
    let (reference, path_query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };
    let reference = reference.split('#').next().unwrap_or_default();

    let absolute = reference.starts_with("//") || Url::parse(reference).is_ok();
    let mut merged = base.query().map(parse_query).unwrap_or_default();

    let mut url = if absolute {
        let mut url = base.join(reference)?;
        url.set_fragment(None);
        url
    } else {
        let mut url = base.clone();
        url.set_fragment(None);
        if reference.starts_with('/') {
            url.set_path(reference);
        } else if !reference.is_empty() {
            let joined = format!("{}/{}", url.path().trim_end_matches('/'), reference);
            url.set_path(&joined);
        }
        url
    };

    if let Some(q) = path_query {
        merge_query(&mut merged, parse_query(q));
    }
    merge_query(&mut merged, query.clone());

    let serialized = build_query(&merged);
    url.set_query(if serialized.is_empty() {
        None
    } else {
        Some(&serialized)
    });
    Ok(url)
}

/// Merges `other` into `target` with array-merge-recursive semantics.
///
/// New keys are inserted. When a key exists on both sides and both values are
/// maps, the maps are merged recursively; otherwise both values are combined
/// into one list, with lists contributing their elements.
///
/// # Examples
///
/// ```
/// use restcore::path::merge_query;
/// use serde_json::json;
///
/// let mut target = json!({"tag": "a", "page": {"size": 1}}).as_object().unwrap().clone();
/// let other = json!({"tag": ["b", "c"], "page": {"after": "x"}}).as_object().unwrap().clone();
/// merge_query(&mut target, other);
///
/// assert_eq!(
///     serde_json::Value::Object(target),
///     json!({"tag": ["a", "b", "c"], "page": {"size": 1, "after": "x"}})
/// );
/// ```
pub fn merge_query(target: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
            }
            Some(Value::Object(existing)) if value.is_object() => {
                if let Value::Object(incoming) = value {
                    merge_query(existing, incoming);
                }
            }
            Some(existing) => {
                let mut items = into_items(existing.take());
                items.extend(into_items(value));
                *existing = Value::Array(items);
            }
        }
    }
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Parses a query string into a nested map, honoring `key[]` and `key[sub]`.
///
/// Indexed keys (`key[0]`, `key[1]`, ...) become lists ordered by index, so the
/// output of [`build_query`] parses back to the same structure.
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let (root, subkeys) = split_brackets(&key);
        let mut incoming = Value::String(value.into_owned());
        for sub in subkeys.iter().rev() {
            incoming = if sub.is_empty() {
                Value::Array(vec![incoming])
            } else {
                let mut map = Map::new();
                map.insert(sub.clone(), incoming);
                Value::Object(map)
            };
        }
        let mut single = Map::new();
        single.insert(root, incoming);
        merge_query(&mut out, single);
    }
    out.into_iter()
        .map(|(key, value)| (key, indexed_to_list(value)))
        .collect()
}

fn indexed_to_list(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            let indexed: Option<Vec<(usize, String)>> = map
                .keys()
                .map(|k| k.parse().ok().map(|i| (i, k.clone())))
                .collect();
            match indexed {
                Some(mut keys) if !keys.is_empty() => {
                    keys.sort_unstable();
                    Value::Array(
                        keys.iter()
                            .filter_map(|(_, key)| map.remove(key))
                            .map(indexed_to_list)
                            .collect(),
                    )
                }
                _ => Value::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, indexed_to_list(value)))
                        .collect(),
                ),
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(indexed_to_list).collect()),
        other => other,
    }
}

fn split_brackets(key: &str) -> (String, Vec<String>) {
    let Some(open) = key.find('[') else {
        return (key.to_string(), Vec::new());
    };
    if open == 0 || !key.ends_with(']') {
        return (key.to_string(), Vec::new());
    }
    let root = key[..open].to_string();
    let subkeys = key[open + 1..key.len() - 1]
        .split("][")
        .map(str::to_string)
        .collect();
    (root, subkeys)
}

/// Serializes a query map with RFC 3986 percent-encoding.
///
/// Lists become `key[0]=…&key[1]=…`, maps become `key[sub]=…`, booleans are
/// written as `true`/`false` and nulls are dropped.
pub fn build_query(query: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in query {
        push_pairs(&mut pairs, key.clone(), value);
    }
    pairs.join("&")
}

fn push_pairs(pairs: &mut Vec<String>, key: String, value: &Value) {
    let scalar = match value {
        Value::Null => return,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                push_pairs(pairs, format!("{key}[{i}]"), item);
            }
            return;
        }
        Value::Object(map) => {
            for (sub, item) in map {
                push_pairs(pairs, format!("{key}[{sub}]"), item);
            }
            return;
        }
    };
    pairs.push(format!(
        "{}={}",
        encode_component(&key),
        encode_component(&scalar)
    ));
}
