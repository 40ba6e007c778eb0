//! Construct paths, logical ids and node addresses

use crate::error::{AppError, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// Id of a construct that is hidden from paths and logical ids
pub const DEFAULT_CHILD_ID: &str = "Default";

/// Id of a construct's primary resource; hidden from the human part of logical ids
pub const RESOURCE_CHILD_ID: &str = "Resource";

const ADDRESS_PREFIX: &str = "c8";
const HASH_LEN: usize = 8;
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Path of a construct relative to its stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstructPath(Vec<String>);

impl ConstructPath {
    pub fn root(id: &str) -> Result<Self> {
        validate_id(id)?;
        Ok(Self(vec![id.to_string()]))
    }

    pub fn child(&self, id: &str) -> Result<Self> {
        validate_id(id)?;
        let mut components = self.0.clone();
        components.push(id.to_string());
        Ok(Self(components))
    }

    pub fn components(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }

    /// Id of the last component
    pub fn id(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }
}

impl fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(AppError::invalid("id", "construct id must not be empty"));
    }
    if id.contains('/') {
        return Err(AppError::invalid(
            "id",
            format!("construct id '{}' must not contain '/'", id),
        ));
    }
    Ok(())
}

/// Stable template id for the resource at `components`.
///
/// A single component keeps its alphanumeric characters. Deeper paths join
/// their human-readable components and append a hash of the full path, so
/// two paths that read the same still get distinct ids.
pub fn logical_id(components: &[&str]) -> Result<String> {
    let components: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != DEFAULT_CHILD_ID)
        .collect();

    match components.as_slice() {
        [] => Err(AppError::Synthesis(
            "unable to compute a logical id for an empty path".to_string(),
        )),
        [only] => {
            let candidate = remove_non_alphanumeric(only);
            if candidate.is_empty() {
                return Err(AppError::invalid(
                    "id",
                    format!("construct id '{}' has no alphanumeric characters", only),
                ));
            }
            if candidate.len() <= MAX_LOGICAL_ID_LEN {
                Ok(candidate)
            } else {
                Ok(hashed_id(&components))
            }
        }
        _ => Ok(hashed_id(&components)),
    }
}

fn hashed_id(components: &[&str]) -> String {
    let hash = path_hash(components);
    let human: String = remove_dupes(components)
        .into_iter()
        .filter(|c| *c != RESOURCE_CHILD_ID)
        .map(remove_non_alphanumeric)
        .collect();
    let max_human = MAX_LOGICAL_ID_LEN - HASH_LEN;
    let human: String = human.chars().take(max_human).collect();
    format!("{}{}", human, hash)
}

fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join("/").as_bytes());
    hex::encode(digest)[..HASH_LEN].to_uppercase()
}

/// Drop a component when the previous one already ends with it
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::with_capacity(components.len());
    for component in components {
        if let Some(prev) = out.last() {
            if prev.ends_with(component) {
                continue;
            }
        }
        out.push(component);
    }
    out
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Globally unique address of a construct: `c8` followed by the SHA-1 of
/// its full path (stack name first), `Default` components skipped.
pub fn node_address(components: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for component in components.iter().filter(|c| **c != DEFAULT_CHILD_ID) {
        hasher.update(component.as_bytes());
        hasher.update(b"\n");
    }
    format!("{}{}", ADDRESS_PREFIX, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_component_keeps_alphanumerics() {
        assert_eq!(logical_id(&["API Gateway URL"]).unwrap(), "APIGatewayURL");
        assert_eq!(logical_id(&["UserPoolId"]).unwrap(), "UserPoolId");
    }

    #[test]
    fn test_nested_component_gets_hash_suffix() {
        let id = logical_id(&["awscdk-amplify-cognito", "Resource"]).unwrap();
        assert!(id.starts_with("awscdkamplifycognito"));
        assert_eq!(id.len(), "awscdkamplifycognito".len() + HASH_LEN);
        assert!(id[id.len() - HASH_LEN..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_default_is_hidden_everywhere() {
        assert_eq!(
            logical_id(&["exampleapi", "Default", "example", "Resource"]).unwrap(),
            logical_id(&["exampleapi", "example", "Resource"]).unwrap()
        );
    }

    #[test]
    fn test_resource_only_hidden_from_human_part() {
        let with = logical_id(&["Handler", "Resource"]).unwrap();
        let without = logical_id(&["Handler", "Role"]).unwrap();
        assert!(with.starts_with("Handler"));
        assert!(without.starts_with("HandlerRole"));
        assert_ne!(with[7..], without[11..]);
    }

    #[test]
    fn test_dupes_removed_from_human_part() {
        let id = logical_id(&["MyBucket", "Bucket"]).unwrap();
        assert!(id.starts_with("MyBucket"));
        assert!(!id.starts_with("MyBucketBucket"));
    }

    #[test]
    fn test_logical_id_is_deterministic() {
        let a = logical_id(&["ExampleHandler", "ServiceRole", "Resource"]).unwrap();
        let b = logical_id(&["ExampleHandler", "ServiceRole", "Resource"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(logical_id(&[]).is_err());
        assert!(logical_id(&["Default"]).is_err());
    }

    #[test]
    fn test_node_address_shape() {
        let addr = node_address(&["AwscdkamplifycognitoStack", "UserPoolWebClient"]);
        assert!(addr.starts_with("c8"));
        assert_eq!(addr.len(), 42);
        assert_eq!(
            addr,
            node_address(&["AwscdkamplifycognitoStack", "Default", "UserPoolWebClient"])
        );
        assert_ne!(addr, node_address(&["OtherStack", "UserPoolWebClient"]));
    }

    #[test]
    fn test_path_rejects_slashes_and_empty_ids() {
        assert!(ConstructPath::root("").is_err());
        assert!(ConstructPath::root("a/b").is_err());
        let path = ConstructPath::root("api").unwrap().child("Default").unwrap();
        assert_eq!(path.to_string(), "api/Default");
        assert_eq!(path.id(), "Default");
        assert!(!path.is_top_level());
    }
}
