//! VCL condition rendering.

use edgeward_core::Acl;

/// VCL variable holding the client's country code
pub const COUNTRY_FIELD: &str = "client.geo.country_code";

/// VCL variable holding the client's AS number
pub const AS_NUMBER_FIELD: &str = "client.as.number";

/// Condition used when there is nothing to match
const NEVER: &str = "false";

/// One `(client.ip ~ <acl>)` clause per ACL, OR-ed together
pub fn acl_conditions<'a>(acls: impl IntoIterator<Item = &'a Acl>) -> String {
    acls.into_iter()
        .map(|acl| format!("(client.ip ~ {})", acl.name))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// `<field> == <item>` for every item, sorted, OR-ed together
pub fn equal_to_conditions<'a>(
    items: impl IntoIterator<Item = &'a String>,
    field: &str,
    quote: bool,
) -> String {
    let mut items: Vec<&String> = items.into_iter().collect();
    items.sort();

    items
        .into_iter()
        .map(|item| {
            if quote {
                format!("{field} == \"{item}\"")
            } else {
                format!("{field} == {item}")
            }
        })
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Join the non-empty clause groups into a single guard
pub fn guard(groups: &[String]) -> String {
    let condition = groups
        .iter()
        .filter(|group| !group.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" || ");

    if condition.is_empty() {
        format!("if ( {NEVER} )")
    } else {
        format!("if ( {condition} )")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn acl(name: &str) -> Acl {
        Acl::new("1", name, "a", "1")
    }

    #[test]
    fn test_acl_conditions() {
        let acls = vec![acl("acl_1"), acl("acl_2"), acl("acl_3")];
        assert_eq!(
            acl_conditions(&acls),
            "(client.ip ~ acl_1) || (client.ip ~ acl_2) || (client.ip ~ acl_3)"
        );
        assert_eq!(acl_conditions(&[acl("acl_1")]), "(client.ip ~ acl_1)");
        assert_eq!(acl_conditions(Vec::<Acl>::new().iter()), "");
    }

    #[test]
    fn test_countries_are_quoted_and_sorted() {
        let countries: BTreeSet<String> = ["US", "CN"].iter().map(ToString::to_string).collect();
        assert_eq!(
            equal_to_conditions(&countries, COUNTRY_FIELD, true),
            "client.geo.country_code == \"CN\" || client.geo.country_code == \"US\""
        );
    }

    #[test]
    fn test_as_numbers_are_bare() {
        let systems = vec!["64512".to_string(), "1234".to_string()];
        assert_eq!(
            equal_to_conditions(&systems, AS_NUMBER_FIELD, false),
            "client.as.number == 1234 || client.as.number == 64512"
        );
    }

    #[test]
    fn test_guard_skips_empty_groups() {
        assert_eq!(
            guard(&[
                "(client.ip ~ acl_1)".into(),
                String::new(),
                "client.as.number == 1".into()
            ]),
            "if ( (client.ip ~ acl_1) || client.as.number == 1 )"
        );
        assert_eq!(guard(&[String::new(), String::new()]), "if ( false )");
    }
}
