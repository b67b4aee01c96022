use thiserror::Error;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid name: name cannot be empty")]
    Empty,

    #[error(
        "Invalid name '{0}': only letters, digits, '-', '_' and '.' are allowed, starting with a letter or digit"
    )]
    IllegalCharacters(String),

    #[error("Invalid resource name '{0}': expected [<host>/][<application>/]<name>[:tag]")]
    Malformed(String),
}

/// A `[<host>/][<application>/]<repository>[:tag]` reference as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceName {
    pub host: Option<String>,
    pub application: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
}

pub fn parse_resource_name(raw: &str) -> Result<ResourceName, NameError> {
    let malformed = || NameError::Malformed(raw.to_string());

    let parts: Vec<&str> = raw.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(malformed());
    }
    let (host, application, last) = match parts.as_slice() {
        [last] => (None, None, *last),
        [app, last] => (None, Some(*app), *last),
        [host, app, last] => (Some(*host), Some(*app), *last),
        _ => return Err(malformed()),
    };

    let (repository, tag) = match last.split_once(':') {
        Some((_, tag)) if tag.is_empty() || tag.contains(':') => return Err(malformed()),
        Some((repo, tag)) => (repo, Some(tag.to_string())),
        None => (last, None),
    };
    if repository.is_empty() {
        return Err(malformed());
    }

    Ok(ResourceName {
        host: host.map(str::to_string),
        application: application.map(str::to_string),
        repository: repository.to_string(),
        tag,
    })
}

pub fn check_name(name: &str) -> Result<(), NameError> {
    let mut chars = name.chars();
    let first = chars.next().ok_or(NameError::Empty)?;
    let valid = first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(NameError::IllegalCharacters(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_repository() {
        let name = parse_resource_name("nginx").unwrap();
        assert_eq!(name.host, None);
        assert_eq!(name.application, None);
        assert_eq!(name.repository, "nginx");
        assert_eq!(name.tag, None);
    }

    #[test]
    fn application_repository_and_tag() {
        let name = parse_resource_name("devel/nginx:1.27").unwrap();
        assert_eq!(name.application.as_deref(), Some("devel"));
        assert_eq!(name.repository, "nginx");
        assert_eq!(name.tag.as_deref(), Some("1.27"));
    }

    #[test]
    fn host_prefix() {
        let name = parse_resource_name("sailabove.io/devel/nginx").unwrap();
        assert_eq!(name.host.as_deref(), Some("sailabove.io"));
        assert_eq!(name.application.as_deref(), Some("devel"));
    }

    #[test]
    fn malformed_names() {
        for raw in ["", "a/b/c/d", "devel/", "/nginx", "nginx:", ":tag", "nginx:a:b"] {
            assert!(parse_resource_name(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn check_name_rules() {
        assert!(check_name("my-app_2.0").is_ok());
        assert_eq!(check_name(""), Err(NameError::Empty));
        assert!(check_name("-leading").is_err());
        assert!(check_name("with space").is_err());
        assert!(check_name("slash/inside").is_err());
    }
}
