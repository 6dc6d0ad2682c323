//! JSON extraction helpers shared by conditions, ordering and reference
//! resolution.

use crate::{
    param::{ParamBuilder, ParamType},
    query::{
        order::{OrderDirection, SortKey},
        path::JsonPath,
    },
};

/// Text value at `path` inside the document `doc`; `''` when absent.
pub(crate) fn json_value(doc: &str, path: &JsonPath, params: &mut ParamBuilder) -> String {
    let path = params.add(path.to_json_path(), ParamType::String);

    format!("JSON_VALUE({doc}, {path})")
}

/// Absent or JSON `null`.
pub(crate) fn json_is_absent(value: &str) -> String {
    format!("{value} IN ('', 'null')")
}

pub(crate) fn json_is_present(value: &str) -> String {
    format!("{value} NOT IN ('', 'null')")
}

///
/// Ordering over JSON-extracted text.
///
/// Three sort keys, in order: presence (absent values last regardless of
/// direction), numeric value when parseable, then the raw text. Numbers
/// therefore sort numerically and non-numeric text sorts lexically after
/// them.
///

pub(crate) fn json_order_terms(value: &str, direction: OrderDirection) -> Vec<SortKey> {
    vec![
        SortKey::new(json_is_absent(value), "ASC"),
        SortKey::new(
            format!("toFloat64OrNull({value})"),
            format!("{direction} NULLS LAST"),
        ),
        SortKey::new(format!("toString({value})"), direction.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_value_binds_the_path_as_a_parameter() {
        let mut params = ParamBuilder::new("pb");
        let path = JsonPath::new(vec!["param".to_string(), "val".to_string()]);
        let sql = json_value("any(calls_merged.inputs_dump)", &path, &mut params);

        assert_eq!(sql, "JSON_VALUE(any(calls_merged.inputs_dump), {pb_0:String})");
        assert_eq!(
            params.finish().get("pb_0").and_then(|value| value.as_text()),
            Some(r#"$."param"."val""#)
        );
    }

    #[test]
    fn order_terms_put_absent_values_last_in_both_directions() {
        for direction in [OrderDirection::Asc, OrderDirection::Desc] {
            let terms: Vec<String> = json_order_terms("v", direction)
                .iter()
                .map(SortKey::render)
                .collect();

            assert_eq!(terms.len(), 3);
            assert_eq!(terms[0], "v IN ('', 'null') ASC");
            assert_eq!(terms[1], format!("toFloat64OrNull(v) {direction} NULLS LAST"));
            assert_eq!(terms[2], format!("toString(v) {direction}"));
        }
    }
}
