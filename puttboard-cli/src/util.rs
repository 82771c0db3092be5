pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Flatten repeatable flag values that may each hold a comma-separated list.
pub fn split_all(values: &[String]) -> Vec<String> {
    values.iter().flat_map(|value| split_csv(value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" ladder, ,streak,  loop ");
        assert_eq!(parts, vec!["ladder", "streak", "loop"]);
    }

    #[test]
    fn split_all_mixes_repeats_and_lists() {
        let values = vec!["e1,e2".to_string(), " e3 ".to_string(), String::new()];
        assert_eq!(split_all(&values), vec!["e1", "e2", "e3"]);
    }
}
