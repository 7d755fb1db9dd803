//! Response extractor
//!
//! Describe responses wrap the object of interest in a list somewhere in the
//! body. These helpers locate it by a `$.A.B[0].C` path expression and check
//! that the returned object really is the requested one: list APIs may ignore
//! an unknown ID filter and answer with some other object.

use serde_json::Value;

use crate::error::{AlicloudError, Result};

/// One step of a path expression
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let rest = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();

    for part in rest.split('.').filter(|p| !p.is_empty()) {
        let (name, mut indices) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            segments.push(Segment::Field(name));
        }
        while let Some(stripped) = indices.strip_prefix('[') {
            let end = stripped.find(']')?;
            segments.push(Segment::Index(stripped[..end].trim().parse().ok()?));
            indices = &stripped[end + 1..];
        }
        if !indices.is_empty() {
            return None;
        }
    }

    Some(segments)
}

/// Resolve a path expression against a response
pub fn get_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value> {
    let missing = || AlicloudError::AttributeMissing {
        path: path.to_string(),
    };
    let segments = parse_path(path).ok_or_else(missing)?;

    let mut current = value;
    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(name),
            Segment::Index(index) => current.get(index),
        }
        .ok_or_else(missing)?;
    }
    Ok(current)
}

/// Items of the list at `path`; a null value is an empty list
///
/// A lone object is returned as a single-element list. A path that does not
/// resolve is an `AttributeMissing` error, not an absent object.
pub fn items_at(response: &Value, path: &str) -> Result<Vec<Value>> {
    Ok(match get_path(response, path)? {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    })
}

/// Like `items_at`, but a missing value is also an empty list
///
/// For optional sections such as tag listings.
pub fn list_at(response: &Value, path: &str) -> Vec<Value> {
    items_at(response, path).unwrap_or_default()
}

/// The object at `path`; null means the object does not exist
pub fn object_at(response: &Value, path: &str, resource: &str, id: &str) -> Result<Value> {
    match get_path(response, path)? {
        Value::Null => Err(AlicloudError::not_found(resource, id)),
        object => Ok(object.clone()),
    }
}

/// The first element of the list at `path`, checked against the requested ID
///
/// An empty list, or a first element whose `id_field` differs from `id`,
/// means the object does not exist.
pub fn first_with_id(
    response: &Value,
    path: &str,
    id_field: &str,
    id: &str,
    resource: &str,
) -> Result<Value> {
    let first = items_at(response, path)?
        .into_iter()
        .next()
        .ok_or_else(|| AlicloudError::not_found(resource, id))?;

    if first.get(id_field).map(value_to_string).as_deref() != Some(id) {
        return Err(AlicloudError::not_found(resource, id));
    }
    Ok(first)
}

/// The element of the list at `path` whose `id_field` equals `id`
pub fn find_with_id(
    response: &Value,
    path: &str,
    id_field: &str,
    id: &str,
    resource: &str,
) -> Result<Value> {
    items_at(response, path)?
        .into_iter()
        .find(|item| item.get(id_field).map(value_to_string).as_deref() == Some(id))
        .ok_or_else(|| AlicloudError::not_found(resource, id))
}

/// Render a scalar the way it would appear in an ID or status comparison
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_path_walks_fields_and_indices() {
        let response = json!({
            "EmrMainVersion": {
                "ClusterTypeInfoList": {"ClusterTypeInfo": [{"ClusterType": "HADOOP"}]}
            }
        });
        let value = get_path(
            &response,
            "$.EmrMainVersion.ClusterTypeInfoList.ClusterTypeInfo[0].ClusterType",
        )
        .unwrap();
        assert_eq!(value, &json!("HADOOP"));
    }

    #[test]
    fn get_path_reports_missing_attribute() {
        let err = get_path(&json!({"Desktops": []}), "$.Desktops[0]").unwrap_err();
        assert!(matches!(
            err,
            AlicloudError::AttributeMissing { ref path } if path == "$.Desktops[0]"
        ));
        assert!(get_path(&json!({}), "$.A[x]").is_err());
    }

    #[test]
    fn first_with_id_returns_matching_object() {
        let response = json!({"NetworkPackages": [{"NetworkPackageId": "np-1", "Bandwidth": 10}]});
        let object =
            first_with_id(&response, "$.NetworkPackages", "NetworkPackageId", "np-1", "ECD")
                .unwrap();
        assert_eq!(object["Bandwidth"], 10);
    }

    #[test]
    fn mismatched_id_is_not_found() {
        let response = json!({"NetworkPackages": [{"NetworkPackageId": "np-other"}]});
        let err = first_with_id(&response, "$.NetworkPackages", "NetworkPackageId", "np-1", "ECD")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn only_the_first_element_is_checked() {
        let response = json!({"Desktops": [{"DesktopId": "ecd-2"}, {"DesktopId": "ecd-1"}]});
        assert!(first_with_id(&response, "$.Desktops", "DesktopId", "ecd-1", "ECD").is_err());
        assert!(find_with_id(&response, "$.Desktops", "DesktopId", "ecd-1", "ECD").is_ok());
    }

    #[test]
    fn empty_or_null_list_is_not_found() {
        for response in [json!({"Bundles": []}), json!({"Bundles": null})] {
            let err = find_with_id(&response, "$.Bundles", "BundleId", "b-1", "ECD:Bundle")
                .unwrap_err();
            assert!(err.is_not_found());
        }
    }

    #[test]
    fn unresolved_list_path_is_an_error() {
        let response = json!({"RequestId": "r-1"});

        let err =
            find_with_id(&response, "$.Bundles", "BundleId", "b-1", "ECD:Bundle").unwrap_err();
        assert!(matches!(err, AlicloudError::AttributeMissing { ref path } if path == "$.Bundles"));
        assert!(!err.is_not_found());

        let err = first_with_id(&response, "$.Desktops", "DesktopId", "ecd-1", "ECD").unwrap_err();
        assert!(matches!(err, AlicloudError::AttributeMissing { .. }));
    }

    #[test]
    fn list_at_tolerates_missing_sections() {
        assert!(list_at(&json!({}), "$.TagResources").is_empty());
        assert!(items_at(&json!({}), "$.TagResources").is_err());
        assert_eq!(items_at(&json!({"A": {"B": 1}}), "$.A").unwrap().len(), 1);
    }

    #[test]
    fn numeric_ids_are_compared_as_strings() {
        let response = json!({"Invocations": [{"InvokeId": 42}]});
        assert!(first_with_id(&response, "$.Invocations", "InvokeId", "42", "ECD").is_ok());
    }

    #[test]
    fn object_at_null_is_not_found() {
        let response = json!({"Cluster": null});
        let err = object_at(&response, "$.Cluster", "EmrCluster", "c-1").unwrap_err();
        assert!(err.is_not_found());
        let response = json!({"Cluster": {"ClusterId": "c-1"}});
        let object = object_at(&response, "$.Cluster", "EmrCluster", "c-1").unwrap();
        assert_eq!(object["ClusterId"], "c-1");
    }

    #[test]
    fn object_at_unresolved_path_is_an_error() {
        let err = object_at(&json!({"RequestId": "r-1"}), "$.Cluster", "EmrCluster", "c-1")
            .unwrap_err();
        assert!(matches!(err, AlicloudError::AttributeMissing { ref path } if path == "$.Cluster"));
    }

    #[test]
    fn value_to_string_renders_scalars() {
        assert_eq!(value_to_string(&json!("Running")), "Running");
        assert_eq!(value_to_string(&json!(5)), "5");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(null)), "");
    }
}
