use std::collections::HashMap;

/// Assemble a delimited query from a map saying whether each name should be
/// included, e.g. `{"aww": true, "self": true, "pics": false}` with `+`
/// yields `aww+self`.
///
/// Names are sorted so the same registry state always yields the same query.
/// Returns an empty string when nothing is included.
pub fn build_query(names: &HashMap<String, bool>, delim: &str) -> String {
    let mut included: Vec<&str> = names
        .iter()
        .filter(|(_, include)| **include)
        .map(|(name, _)| name.as_str())
        .collect();
    included.sort_unstable();
    included.join(delim)
}

/// Split a query produced by [`build_query`] back into its names.
pub fn split_query<'a>(query: &'a str, delim: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    query.split(delim).filter(|name| !name.is_empty())
}
