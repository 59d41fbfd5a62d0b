//! Exported-component extraction from a sanitized AndroidManifest.xml.
//!
//! One parametrized walk handles both activities and services; the only
//! difference between the two queries is the element tag. Attributes are
//! matched by namespace URI + local name (not by the literal `android:`
//! prefix), so documents that bind the Android namespace to another prefix
//! still resolve correctly.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

/// Namespace URI that qualifies `android:name` / `android:exported`.
pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Activity,
    Service,
}

impl ComponentKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Service => "service",
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse AndroidManifest.xml: {0}")]
    Parse(String),
    #[error("AndroidManifest.xml has no <application> element")]
    MissingApplication,
}

/// Transient view of one `<activity>`/`<service>` declaration.
struct Component {
    name: String,
    exported: Option<String>,
    has_intent_filter: bool,
}

impl Component {
    /// Android's default-export rule: exported iff the attribute is the
    /// literal `"true"`, or the attribute is absent and the component
    /// declares at least one intent filter. Any other explicit value
    /// (including `"false"`) means not exported.
    fn is_exported(&self) -> bool {
        match self.exported.as_deref() {
            Some(value) => value == "true",
            None => self.has_intent_filter,
        }
    }
}

/// Sanitize raw manifest text, then extract exported component names.
pub fn exported_components(raw: &str, kind: ComponentKind) -> Result<Vec<String>, ManifestError> {
    let sanitized = crate::sanitizer::sanitize(raw);
    extract_exported(&sanitized, kind)
}

/// Walk sanitized manifest XML and collect the fully-qualified names of
/// exported components of the given kind, in document order.
///
/// Only direct `<application>` children are considered, and only direct
/// `<intent-filter>` children count toward the export rule. Duplicate
/// candidates are collapsed within a single component's normalization, but
/// two distinct components yielding the same name both contribute it.
pub fn extract_exported(sanitized: &str, kind: ComponentKind) -> Result<Vec<String>, ManifestError> {
    let mut reader = NsReader::from_str(sanitized);
    let tag = kind.tag().as_bytes();

    // depth = number of currently open elements; the root sits at 0,
    // <application> at 1, components at 2, intent filters at 3.
    let mut depth = 0usize;
    let mut package = String::new();
    let mut seen_application = false;
    let mut in_application = false;
    let mut open_component: Option<Component> = None;
    let mut names: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Err(e) => return Err(ManifestError::Parse(e.to_string())),
            Ok(Event::Eof) => {
                if depth > 0 {
                    return Err(ManifestError::Parse(
                        "unexpected end of document inside an open element".into(),
                    ));
                }
                break;
            }
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    package = read_package(&reader, &e);
                } else if depth == 1 && e.local_name().as_ref() == b"application" {
                    seen_application = true;
                    in_application = true;
                } else if depth == 2 && in_application && e.local_name().as_ref() == tag {
                    open_component = read_component(&reader, &e);
                } else if depth == 3 && e.local_name().as_ref() == b"intent-filter" {
                    if let Some(c) = open_component.as_mut() {
                        c.has_intent_filter = true;
                    }
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if depth == 0 {
                    package = read_package(&reader, &e);
                } else if depth == 1 && e.local_name().as_ref() == b"application" {
                    seen_application = true;
                } else if depth == 2 && in_application && e.local_name().as_ref() == tag {
                    // Self-closing component: no intent-filter children possible.
                    if let Some(c) = read_component(&reader, &e) {
                        push_exported(&mut names, &package, &c);
                    }
                } else if depth == 3 && e.local_name().as_ref() == b"intent-filter" {
                    if let Some(c) = open_component.as_mut() {
                        c.has_intent_filter = true;
                    }
                }
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ManifestError::Parse("unbalanced closing tag".into()))?;
                if depth == 2 {
                    if let Some(c) = open_component.take() {
                        push_exported(&mut names, &package, &c);
                    }
                } else if depth == 1 {
                    in_application = false;
                }
            }
            Ok(_) => {}
        }
    }

    if !seen_application {
        return Err(ManifestError::MissingApplication);
    }
    Ok(names)
}

fn is_android_ns(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == ANDROID_NS.as_bytes())
}

/// Non-namespaced `package` attribute of the root element, trimmed.
/// Missing means empty, not an error.
fn read_package(reader: &NsReader<&[u8]>, e: &BytesStart) -> String {
    for attr in e.attributes().filter_map(|a| a.ok()) {
        let (ns, local) = reader.resolve_attribute(attr.key);
        if matches!(ns, ResolveResult::Unbound) && local.as_ref() == b"package" {
            return String::from_utf8_lossy(&attr.value).trim().to_string();
        }
    }
    String::new()
}

/// Read `android:name` / `android:exported` off a component element.
/// Returns None when the name is absent or empty — the component cannot be
/// identified and is skipped entirely.
fn read_component(reader: &NsReader<&[u8]>, e: &BytesStart) -> Option<Component> {
    let mut name: Option<String> = None;
    let mut exported: Option<String> = None;

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let (ns, local) = reader.resolve_attribute(attr.key);
        if !is_android_ns(&ns) {
            continue;
        }
        match local.as_ref() {
            b"name" => name = Some(String::from_utf8_lossy(&attr.value).to_string()),
            b"exported" => exported = Some(String::from_utf8_lossy(&attr.value).to_string()),
            _ => {}
        }
    }

    let name = name.filter(|n| !n.is_empty())?;
    Some(Component {
        name,
        exported,
        has_intent_filter: false,
    })
}

fn push_exported(names: &mut Vec<String>, package: &str, component: &Component) {
    if !component.is_exported() {
        return;
    }
    // Deduplicate within this component's candidates only.
    let mut local: Vec<String> = Vec::new();
    for candidate in qualify(package, &component.name) {
        if !local.contains(&candidate) {
            local.push(candidate);
        }
    }
    names.extend(local);
}

/// Normalize a declared component name into fully-qualified candidates.
///
/// A bare short name may resolve either as a top-level class or relative
/// to the package, so both readings are offered.
fn qualify(package: &str, name: &str) -> Vec<String> {
    if name.starts_with('.') {
        vec![format!("{package}{name}")]
    } else if !name.contains('.') {
        vec![name.to_string(), format!("{package}.{name}")]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(package: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="{package}">
    <application>{body}</application>
</manifest>"#
        )
    }

    fn activities(xml: &str) -> Result<Vec<String>, ManifestError> {
        extract_exported(xml, ComponentKind::Activity)
    }

    #[test]
    fn export_rule_truth_table() {
        for (exported_attr, has_filter, expect_exported) in [
            (Some("true"), true, true),
            (Some("true"), false, true),
            (Some("false"), true, false),
            (Some("false"), false, false),
            (None, true, true),
            (None, false, false),
        ] {
            let attr = exported_attr
                .map(|v| format!(" android:exported=\"{v}\""))
                .unwrap_or_default();
            let filter = if has_filter { "<intent-filter/>" } else { "" };
            let xml = manifest(
                "com.example.app",
                &format!("<activity android:name=\".Foo\"{attr}>{filter}</activity>"),
            );
            let names = activities(&xml).unwrap();
            let expected: Vec<String> = if expect_exported {
                vec!["com.example.app.Foo".into()]
            } else {
                vec![]
            };
            assert_eq!(
                names, expected,
                "exported={exported_attr:?} has_filter={has_filter}"
            );
        }
    }

    #[test]
    fn non_true_exported_values_mean_not_exported() {
        let xml = manifest(
            "com.example.app",
            r#"<activity android:name=".Foo" android:exported="True"><intent-filter/></activity>"#,
        );
        assert!(activities(&xml).unwrap().is_empty());
    }

    #[test]
    fn name_normalization() {
        for (name, expected) in [
            (".Foo", vec!["com.example.app.Foo"]),
            ("Foo", vec!["Foo", "com.example.app.Foo"]),
            ("com.other.Bar", vec!["com.other.Bar"]),
        ] {
            let xml = manifest(
                "com.example.app",
                &format!(r#"<activity android:name="{name}" android:exported="true"/>"#),
            );
            assert_eq!(activities(&xml).unwrap(), expected, "name={name}");
        }
    }

    #[test]
    fn package_attribute_is_trimmed() {
        let xml = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package=" com.x ">
            <application><activity android:name=".A" android:exported="true"/></application>
        </manifest>"#;
        assert_eq!(activities(xml).unwrap(), vec!["com.x.A"]);
    }

    #[test]
    fn nameless_component_is_skipped() {
        let xml = manifest(
            "com.x",
            r#"<activity android:exported="true"/><activity android:name="" android:exported="true"/>"#,
        );
        assert!(activities(&xml).unwrap().is_empty());
    }

    #[test]
    fn missing_application_is_a_distinct_error() {
        let xml = r#"<manifest package="com.x"><uses-sdk/></manifest>"#;
        assert!(matches!(
            activities(xml),
            Err(ManifestError::MissingApplication)
        ));
    }

    #[test]
    fn unclosed_element_is_a_parse_failure() {
        let xml = r#"<manifest package="com.x"><application>"#;
        assert!(matches!(activities(xml), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn mismatched_nesting_is_a_parse_failure() {
        let xml = r#"<manifest><application></manifest></application>"#;
        assert!(matches!(activities(xml), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn android_namespace_matched_by_uri_not_prefix() {
        let xml = r#"<manifest xmlns:a="http://schemas.android.com/apk/res/android" package="com.x">
            <application><activity a:name=".Main" a:exported="true"/></application>
        </manifest>"#;
        assert_eq!(activities(xml).unwrap(), vec!["com.x.Main"]);
    }

    #[test]
    fn unnamespaced_attributes_are_not_recognized() {
        let xml = manifest("com.x", r#"<activity name=".Main" exported="true"/>"#);
        assert!(activities(&xml).unwrap().is_empty());
    }

    #[test]
    fn foreign_namespace_attributes_are_not_recognized() {
        let xml = r#"<manifest xmlns:android="http://example.com/not-android" package="com.x">
            <application><activity android:name=".Main" android:exported="true"/></application>
        </manifest>"#;
        assert!(activities(xml).unwrap().is_empty());
    }

    #[test]
    fn only_direct_application_children_are_considered() {
        let xml = manifest(
            "com.x",
            r#"<activity-alias><activity android:name=".Nested" android:exported="true"/></activity-alias>"#,
        );
        assert!(activities(&xml).unwrap().is_empty());
    }

    #[test]
    fn components_outside_application_are_ignored() {
        let xml = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.x">
            <activity android:name=".Stray" android:exported="true"/>
            <application/>
        </manifest>"#;
        assert!(activities(xml).unwrap().is_empty());
    }

    #[test]
    fn only_direct_intent_filter_children_count() {
        let xml = manifest(
            "com.x",
            r#"<activity android:name=".Main"><layout><intent-filter/></layout></activity>"#,
        );
        assert!(activities(&xml).unwrap().is_empty());
    }

    #[test]
    fn cross_component_duplicates_are_preserved_in_document_order() {
        let xml = manifest(
            "com.x",
            r#"<service android:name=".S" android:exported="true"/>
               <service android:name="com.x.S" android:exported="true"/>
               <service android:name=".Other" android:exported="true"/>"#,
        );
        let names = extract_exported(&xml, ComponentKind::Service).unwrap();
        assert_eq!(names, vec!["com.x.S", "com.x.S", "com.x.Other"]);
    }

    #[test]
    fn kind_selects_the_tag() {
        let xml = manifest(
            "com.x",
            r#"<activity android:name=".A" android:exported="true"/>
               <service android:name=".S" android:exported="true"/>"#,
        );
        assert_eq!(activities(&xml).unwrap(), vec!["com.x.A"]);
        assert_eq!(
            extract_exported(&xml, ComponentKind::Service).unwrap(),
            vec!["com.x.S"]
        );
    }

    #[test]
    fn end_to_end_sanitize_then_extract() {
        // Raw daemon output: illegal control bytes plus malformed meta-data
        // entries that would abort a strict parse.
        let raw = "<?xml version=\"1.0\"?>\u{0}\
<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"com.x\">\
<application>\
<meta-data android:name=\"bad\" android:value=\"<<\u{1}>>\" />\
<activity android:name=\".Main\"><intent-filter><action android:name=\"android.intent.action.MAIN\"/></intent-filter></activity>\
<activity android:name=\"Hidden\" android:exported=\"false\"/>\
</application>\
</manifest>";
        let names = exported_components(raw, ComponentKind::Activity).unwrap();
        assert_eq!(names, vec!["com.x.Main"]);
    }
}
