//! Environment composition
//!
//! Flattens the three task-declared mappings into the variable set injected
//! into the container and the exec session.

use std::collections::BTreeMap;

/// Flat variable set, sorted by key
pub type Environment = BTreeMap<String, String>;

/// Merge `environment`, then `inputs`, then `outputs`; later wins on a key
/// collision. Names and values pass through unvalidated.
pub fn compose_environment(
    environment: &BTreeMap<String, String>,
    inputs: &BTreeMap<String, String>,
    outputs: &BTreeMap<String, String>,
) -> Environment {
    let mut composed = Environment::new();
    for layer in [environment, inputs, outputs] {
        composed.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    composed
}

/// `KEY=VALUE` pairs in the format the Docker API expects
pub fn to_env_vars(env: &Environment) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_outputs_win() {
        let env = compose_environment(
            &map(&[("A", "1")]),
            &map(&[("A", "2")]),
            &map(&[("A", "3")]),
        );
        assert_eq!(env["A"], "3");
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_inputs_override_environment() {
        let env = compose_environment(
            &map(&[("A", "1"), ("B", "env")]),
            &map(&[("B", "input")]),
            &BTreeMap::new(),
        );
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "input");
    }

    #[test]
    fn test_union_of_keys() {
        let env = compose_environment(
            &map(&[("VAR1", "VALUE1")]),
            &map(&[("TXT_FILE", "https://example.com/countries.txt")]),
            &map(&[("OUTPUT_FILE", "/tmp/countries.txt")]),
        );
        assert_eq!(env.len(), 3);
        assert_eq!(env["OUTPUT_FILE"], "/tmp/countries.txt");
    }

    #[test]
    fn test_values_are_opaque() {
        let env = compose_environment(
            &map(&[("weird name", "a=b; $(rm -rf /)")]),
            &BTreeMap::new(),
            &BTreeMap::new(),
        );
        assert_eq!(env["weird name"], "a=b; $(rm -rf /)");
    }

    #[test]
    fn test_to_env_vars() {
        let env = compose_environment(
            &map(&[("B", "2"), ("A", "1")]),
            &BTreeMap::new(),
            &BTreeMap::new(),
        );
        assert_eq!(to_env_vars(&env), vec!["A=1", "B=2"]);
    }
}
