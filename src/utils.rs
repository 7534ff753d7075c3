/// Split the query part of a request URL into raw key/value pairs.
///
/// No percent-decoding is applied; the pattern catalog carries encoded
/// variants of the signatures it cares about.
pub fn parse_query_params(url: &str) -> Vec<(String, String)> {
    let query = match url.split_once('?') {
        Some((_, query)) => query,
        None => return Vec::new(),
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_pairs() {
        let params = parse_query_params("/search?q=rust&page=2&flag");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], ("q".to_string(), "rust".to_string()));
        assert_eq!(params[1], ("page".to_string(), "2".to_string()));
        assert_eq!(params[2], ("flag".to_string(), String::new()));
    }

    #[test]
    fn no_query_yields_nothing() {
        assert!(parse_query_params("/api/status").is_empty());
    }
}
