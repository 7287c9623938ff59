use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const STRESS_TESTID: &str = "STRESS_TESTID";
pub const STRESS_BUILDID: &str = "STRESS_BUILDID";
/// Aggregate of every other variable, handed to the dump uploader as metadata.
pub const DUMPLING_PROPERTIES: &str = "DUMPLING_PROPERTIES";

/// Environment map shared by every descriptor built from one suite config.
pub type SharedEnvironment = Rc<RefCell<EnvironmentVariables>>;

/// Insertion-ordered environment map.
///
/// Re-inserting an existing name updates the value where it already sits, so
/// the emitted `export`/`set` lines keep a stable order across regenerations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariables {
    entries: Vec<(String, String)>,
}

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedEnvironment {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = EnvironmentVariables::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}

impl From<&BTreeMap<String, String>> for EnvironmentVariables {
    fn from(map: &BTreeMap<String, String>) -> Self {
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Build id is the test name up to its first underscore.
pub fn build_id_for(test_name: &str) -> &str {
    test_name.split('_').next().unwrap_or(test_name)
}

/// Quoted, space separated `key=value` list of the whole map.
pub fn dumpling_properties(env: &EnvironmentVariables) -> String {
    let mut props = String::new();
    for (k, v) in env.iter() {
        props.push_str(k);
        props.push('=');
        props.push_str(v);
        props.push(' ');
    }
    format!("\"{}\"", props.trim_end_matches(' '))
}

/// Rewrites the derived variables for `test_name`.
///
/// The map may still carry the aggregate of a previous test, so it is dropped
/// before anything is computed; otherwise the new aggregate would embed the
/// old one.
pub fn recompute_derived_variables(env: &mut EnvironmentVariables, test_name: &str) {
    env.remove(DUMPLING_PROPERTIES);
    env.insert(STRESS_TESTID, test_name);
    env.insert(STRESS_BUILDID, build_id_for(test_name));
    let props = dumpling_properties(env);
    env.insert(DUMPLING_PROPERTIES, props);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> EnvironmentVariables {
        [("COMPlus_GCStress", "0xC"), ("DOTNET_gcServer", "1")]
            .into_iter()
            .collect()
    }

    #[test]
    fn build_id_stops_at_first_underscore() {
        assert_eq!(build_id_for("Foo_Bar_1"), "Foo");
        assert_eq!(build_id_for("Standalone"), "Standalone");
        assert_eq!(build_id_for("_leading"), "");
    }

    #[test]
    fn insert_updates_in_place_and_remove_keeps_order() {
        let mut env = base_env();
        env.insert("EXTRA", "x");
        env.insert("COMPlus_GCStress", "0x3");
        let names: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["COMPlus_GCStress", "DOTNET_gcServer", "EXTRA"]);
        assert_eq!(env.get("COMPlus_GCStress"), Some("0x3"));

        assert_eq!(env.remove("DOTNET_gcServer").as_deref(), Some("1"));
        let names: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["COMPlus_GCStress", "EXTRA"]);
        assert!(env.remove("missing").is_none());
    }

    #[test]
    fn derived_variables_are_appended_after_caller_entries() {
        let mut env = base_env();
        recompute_derived_variables(&mut env, "Foo_Bar_1");
        assert_eq!(env.get(STRESS_TESTID), Some("Foo_Bar_1"));
        assert_eq!(env.get(STRESS_BUILDID), Some("Foo"));
        assert_eq!(
            env.get(DUMPLING_PROPERTIES),
            Some("\"COMPlus_GCStress=0xC DOTNET_gcServer=1 STRESS_TESTID=Foo_Bar_1 STRESS_BUILDID=Foo\"")
        );
        let last = env.iter().last().map(|(k, _)| k);
        assert_eq!(last, Some(DUMPLING_PROPERTIES));
    }

    #[test]
    fn recompute_is_idempotent_on_a_reused_map() {
        let mut env = base_env();
        recompute_derived_variables(&mut env, "Foo_1");
        let first = env.clone();
        recompute_derived_variables(&mut env, "Foo_1");
        assert_eq!(env, first);
    }

    #[test]
    fn aggregate_never_contains_itself() {
        let mut env = base_env();
        env.insert(DUMPLING_PROPERTIES, "\"stale=1\"");
        for name in ["A_1", "B_2", "C"] {
            recompute_derived_variables(&mut env, name);
            let props = env.get(DUMPLING_PROPERTIES).unwrap_or_default();
            assert!(!props.contains("DUMPLING_PROPERTIES="), "nested: {}", props);
            assert!(!props.contains("stale"), "stale value leaked: {}", props);
        }
        assert_eq!(env.get(STRESS_TESTID), Some("C"));
        assert_eq!(env.get(STRESS_BUILDID), Some("C"));
    }

    #[test]
    fn empty_map_still_gets_derived_entries() {
        let mut env = EnvironmentVariables::new();
        recompute_derived_variables(&mut env, "Solo");
        assert_eq!(env.len(), 3);
        assert_eq!(
            env.get(DUMPLING_PROPERTIES),
            Some("\"STRESS_TESTID=Solo STRESS_BUILDID=Solo\"")
        );
    }
}
