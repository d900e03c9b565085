use anyhow::{Result, anyhow, bail};
use log::info;

/// Parses a transposition list: a range (`-12..=12`, `-3..3`) or comma-separated values.
pub fn parse_transpositions(input: &str) -> Result<Vec<i32>> {
    let input = input.trim();

    let parse_one = |s: &str| -> Result<i32> {
        s.trim()
            .parse::<i32>()
            .map_err(|e| anyhow!("Invalid transposition '{}': {}", s, e))
    };

    let values: Vec<i32> = if let Some((lo, hi)) = input.split_once("..=") {
        (parse_one(lo)?..=parse_one(hi)?).collect()
    } else if let Some((lo, hi)) = input.split_once("..") {
        (parse_one(lo)?..parse_one(hi)?).collect()
    } else {
        input
            .split(',')
            .map(parse_one)
            .collect::<Result<Vec<_>>>()?
    };

    if values.is_empty() {
        bail!("Transposition list '{}' is empty..!", input);
    }

    if values.iter().any(|v| v.abs() > 24) {
        info!("Transpositions beyond two octaves requested: {:?}", values);
    }

    Ok(values)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ranges_and_lists() {
        assert_eq!(parse_transpositions("-2..=2").unwrap(), vec![-2, -1, 0, 1, 2]);
        assert_eq!(parse_transpositions("0..3").unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_transpositions("0, 5,-5").unwrap(), vec![0, 5, -5]);
        assert_eq!(parse_transpositions("7").unwrap(), vec![7]);
    }

    #[test]
    fn bad_input() {
        assert!(parse_transpositions("3..3").is_err());
        assert!(parse_transpositions("a,b").is_err());
        assert!(parse_transpositions("").is_err());
    }
}
