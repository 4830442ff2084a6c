use crate::paths::normalise;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub name: String,
    pub path: String,
    pub admin: Option<String>,
    pub color: Option<String>,
}

impl Environment {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            admin: None,
            color: None,
        }
    }

    /// Decodes one registry record. Never fails: missing or unusable fields
    /// become an empty name/path and absent admin/colour.
    pub fn from_value(value: &Value) -> Self {
        Self {
            name: field(value, "Name", "name").unwrap_or_default(),
            path: field(value, "Path", "path").unwrap_or_default(),
            admin: field(value, "Admin", "admin"),
            color: field(value, "Color", "color"),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Name": self.name,
            "Path": self.path,
            "Admin": self.admin,
            "Color": self.color,
        })
    }

    pub fn normalised_path(&self) -> String {
        normalise(&self.path)
    }
}

// An empty value under the capitalised key falls through to the lower-case one.
fn field(value: &Value, primary: &str, fallback: &str) -> Option<String> {
    scalar_text(value.get(primary)).or_else(|| scalar_text(value.get(fallback)))
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(true) => "True".to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathIssue {
    pub index: usize,
    pub name: String,
    pub original: String,
    pub normalised: String,
}

/// Transient, ordered projection of the registry document.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    environments: Vec<Environment>,
}

impl Registry {
    pub fn from_records(records: &[Value]) -> Self {
        Self {
            environments: records.iter().map(Environment::from_value).collect(),
        }
    }

    pub fn list(&self) -> &[Environment] {
        &self.environments
    }

    pub fn into_vec(self) -> Vec<Environment> {
        self.environments
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Position of the environment called `name`; an exact match wins over a
    /// case-insensitive one.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.environments
            .iter()
            .position(|env| env.name == name)
            .or_else(|| {
                let wanted = name.to_lowercase();
                self.environments
                    .iter()
                    .position(|env| env.name.to_lowercase() == wanted)
            })
    }

    pub fn find(&self, name: &str) -> Option<&Environment> {
        self.position(name).map(|index| &self.environments[index])
    }

    /// True when `name` or the normalised `path` is already taken.
    pub fn conflicts_with(&self, name: &str, path: &str) -> bool {
        let wanted = normalise(path);
        self.environments
            .iter()
            .any(|env| env.name == name || env.normalised_path() == wanted)
    }

    pub fn push(&mut self, environment: Environment) {
        self.environments.push(environment);
    }

    pub fn remove(&mut self, index: usize) -> Environment {
        self.environments.remove(index)
    }

    pub fn sanitise_paths(&self) -> Vec<PathIssue> {
        sanitise_paths(&self.environments)
    }

    pub fn apply_fixes(&mut self, issues: &[PathIssue]) {
        for issue in issues {
            if let Some(env) = self.environments.get_mut(issue.index) {
                env.path = issue.normalised.clone();
            }
        }
    }
}

pub fn sanitise_paths(environments: &[Environment]) -> Vec<PathIssue> {
    environments
        .iter()
        .enumerate()
        .filter_map(|(index, env)| {
            let clean = env.normalised_path();
            (env.path != clean).then(|| PathIssue {
                index,
                name: env.name.clone(),
                original: env.path.clone(),
                normalised: clean,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(records: Value) -> Registry {
        Registry::from_records(records.as_array().unwrap())
    }

    #[test]
    fn decoding_tolerates_missing_and_odd_fields() {
        let reg = registry(json!([
            {"Name": "Alpha", "Path": "C:\\a", "Admin": "a@example.com", "Color": "Blue"},
            {"name": "beta", "path": "C:/b"},
            {"Name": "", "name": "gamma", "Admin": null, "Color": ""},
            {"Name": 42, "Path": ["not", "a", "path"]},
            "garbage",
        ]));
        let list = reg.list();
        assert_eq!(list.len(), 5);
        assert_eq!(list[0].admin.as_deref(), Some("a@example.com"));
        assert_eq!(list[0].color.as_deref(), Some("Blue"));
        assert_eq!(list[1].name, "beta");
        assert_eq!(list[1].path, "C:/b");
        assert_eq!(list[2].name, "gamma");
        assert_eq!(list[2].path, "");
        assert_eq!(list[2].admin, None);
        assert_eq!(list[2].color, None);
        assert_eq!(list[3].name, "42");
        assert_eq!(list[3].path, "");
        assert_eq!(list[4], Environment::new("", ""));
    }

    #[test]
    fn record_round_trip_keeps_every_field() {
        let env = Environment {
            name: "Round Trip".to_string(),
            path: "C:\\Clients\\RoundTrip".to_string(),
            admin: Some("admin@example.com".to_string()),
            color: None,
        };
        let value = env.to_value();
        assert_eq!(value["Color"], Value::Null);
        assert_eq!(Environment::from_value(&value), env);
    }

    #[test]
    fn find_is_case_insensitive_and_prefers_exact() {
        let reg = registry(json!([
            {"Name": "school", "Path": "C:\\one"},
            {"Name": "School", "Path": "C:\\two"},
        ]));
        assert_eq!(reg.find("SCHOOL").unwrap().path, "C:\\one");
        assert_eq!(reg.find("School").unwrap().path, "C:\\two");
        assert!(reg.find("college").is_none());
    }

    #[test]
    fn conflicts_compare_normalised_paths() {
        let reg = registry(json!([{"Name": "A", "Path": "\"C:/Clients/A\""}]));
        assert!(reg.conflicts_with("A", "C:\\elsewhere"));
        assert!(reg.conflicts_with("B", "C:\\Clients\\A"));
        assert!(!reg.conflicts_with("a", "C:\\Clients\\a2"));
    }

    #[test]
    fn sanitise_reports_in_registry_order_and_fixes_apply() {
        let mut reg = registry(json!([
            {"Name": "clean", "Path": "C:\\ok"},
            {"Name": "slashes", "Path": "C:/bad/one"},
            {"Name": "quoted", "Path": " \"C:\\two\" "},
        ]));
        let issues = reg.sanitise_paths();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].index, 1);
        assert_eq!(issues[0].normalised, "C:\\bad\\one");
        assert_eq!(issues[1].index, 2);
        assert_eq!(issues[1].original, " \"C:\\two\" ");
        reg.apply_fixes(&issues);
        assert!(reg.sanitise_paths().is_empty());
        assert_eq!(reg.list()[2].path, "C:\\two");
    }
}
