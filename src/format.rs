// Plain-text rendering of command results

use serde_json::{Map, Value};
use tabled::{builder::Builder, settings::Style};

use crate::service::{
    CollectionDetails, Connection, IndexDetails, InsertSummary, LoadProgress, PartitionDetails,
    SearchHit,
};

fn render(builder: Builder) -> String {
    let mut table = builder.build();
    table.with(Style::ascii());
    table.to_string()
}

/// Two-column table of labelled values.
pub fn key_value_table(rows: &[(&str, String)]) -> String {
    let mut builder = Builder::default();
    for (key, value) in rows {
        builder.push_record([key.to_string(), value.clone()]);
    }
    render(builder)
}

/// Table with a header row and a leading row-number column.
pub fn indexed_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut builder = Builder::default();
    builder.push_record(
        std::iter::once(String::new()).chain(headers.iter().map(|h| h.to_string())),
    );
    for (i, row) in rows.iter().enumerate() {
        builder.push_record(std::iter::once(i.to_string()).chain(row.iter().cloned()));
    }
    render(builder)
}

/// Renders a JSON value without quoting plain strings.
pub fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn connection_table(connections: &[(&Connection, bool)]) -> String {
    let rows: Vec<Vec<String>> = connections
        .iter()
        .map(|(c, active)| {
            vec![
                c.alias.clone(),
                format!("{}:{}", c.host, c.port),
                if *active { "*".to_string() } else { String::new() },
            ]
        })
        .collect();
    indexed_table(&["Alias", "Address", "Active"], &rows)
}

pub fn name_list(header: &str, names: &[String]) -> String {
    let rows: Vec<Vec<String>> = names.iter().map(|n| vec![n.clone()]).collect();
    indexed_table(&[header], &rows)
}

pub fn collection_details(details: &CollectionDetails) -> String {
    let fields: Vec<String> = details
        .fields
        .iter()
        .map(|f| {
            let mut line = format!("- {} {}", f.name, f.data_type);
            if let Some(dim) = f.dim {
                line.push_str(&format!(" dim={}", dim));
            }
            if f.is_primary {
                line.push_str(" *primary");
            }
            if !f.description.is_empty() {
                line.push_str(&format!(" '{}'", f.description));
            }
            line
        })
        .collect();
    let auto_id = details.primary_field().map(|f| f.auto_id).unwrap_or(false);
    key_value_table(&[
        ("Name", details.name.clone()),
        ("Description", details.description.clone()),
        ("Is Empty", (details.num_entities == 0).to_string()),
        ("Entities", details.num_entities.to_string()),
        ("Primary Field", details.primary_field().map(|f| f.name.clone()).unwrap_or_default()),
        ("Auto ID", auto_id.to_string()),
        ("Schema", fields.join("\n")),
        ("Partitions", details.partitions.join("\n")),
        ("Indexes", details.indexes.join("\n")),
        ("Load State", details.load_state.clone()),
    ])
}

pub fn partition_details(collection: &str, details: &PartitionDetails) -> String {
    key_value_table(&[
        ("Partition Name", details.name.clone()),
        ("Collection Name", collection.to_string()),
        ("Is Empty", (details.num_entities == 0).to_string()),
        ("Num Entities", details.num_entities.to_string()),
    ])
}

pub fn index_details(index: &IndexDetails) -> String {
    let params: Vec<String> = index
        .params
        .iter()
        .map(|(k, v)| format!("- {}: {}", k, cell(v)))
        .collect();
    key_value_table(&[
        ("Corresponding Collection", index.collection.clone()),
        ("Corresponding Field", index.field_name.clone()),
        ("Index Name", index.index_name.clone()),
        ("Index Type", index.index_type.clone()),
        ("Metric Type", index.metric_type.clone()),
        ("Params", params.join("\n")),
    ])
}

pub fn index_list(indexes: &[IndexDetails]) -> String {
    let rows: Vec<Vec<String>> = indexes
        .iter()
        .map(|i| {
            vec![
                i.index_name.clone(),
                i.field_name.clone(),
                i.index_type.clone(),
                i.metric_type.clone(),
            ]
        })
        .collect();
    indexed_table(&["Index Name", "Field Name", "Index Type", "Metric Type"], &rows)
}

pub fn index_progress(index: &IndexDetails) -> String {
    key_value_table(&[
        ("Index State", index.state.clone()),
        ("Indexed Rows", index.indexed_rows.to_string()),
        ("Total Rows", index.total_rows.to_string()),
    ])
}

pub fn loading_progress(progress: &LoadProgress) -> String {
    key_value_table(&[
        ("Load State", progress.state.clone()),
        ("Loading Progress", format!("{}%", progress.progress)),
    ])
}

/// One `No.N:` block per query vector.
pub fn search_results(results: &[Vec<SearchHit>]) -> String {
    let mut out = Vec::new();
    for (i, hits) in results.iter().enumerate() {
        let extra: Vec<String> = hits
            .first()
            .map(|h| h.fields.keys().cloned().collect())
            .unwrap_or_default();
        let mut headers = vec!["ID", "Distance"];
        headers.extend(extra.iter().map(String::as_str));
        let rows: Vec<Vec<String>> = hits
            .iter()
            .map(|hit| {
                let mut row = vec![cell(&hit.id), hit.distance.to_string()];
                row.extend(extra.iter().map(|k| hit.fields.get(k).map(cell).unwrap_or_default()));
                row
            })
            .collect();
        out.push(format!("Search result No.{}:\n{}", i + 1, indexed_table(&headers, &rows)));
    }
    out.join("\n")
}

/// Column names of a query result, in first-seen order.
pub fn query_columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn query_results(rows: &[Map<String, Value>]) -> String {
    let columns = query_columns(rows);
    let headers: Vec<&str> = columns.iter().map(String::as_str).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    format!("{}\nQuery returned {} entities.", indexed_table(&headers, &cells), rows.len())
}

pub fn distance_results(matrix: &[Vec<f32>]) -> String {
    let width = matrix.iter().map(Vec::len).max().unwrap_or(0);
    let headers: Vec<String> = (0..width).map(|j| format!("right[{}]", j)).collect();
    let mut builder = Builder::default();
    builder.push_record(std::iter::once(String::new()).chain(headers));
    for (i, row) in matrix.iter().enumerate() {
        builder.push_record(
            std::iter::once(format!("left[{}]", i)).chain(row.iter().map(|d| d.to_string())),
        );
    }
    format!(
        "{}\nA distance of -1 means the vector id was not found.",
        render(builder)
    )
}

pub fn insert_summary(collection: &str, summary: &InsertSummary) -> String {
    key_value_table(&[
        ("Collection", collection.to_string()),
        ("Inserted", summary.insert_count.to_string()),
        ("Total Entities", total_entities(summary)),
    ])
}

fn total_entities(summary: &InsertSummary) -> String {
    if summary.flushed {
        summary.total_entities.to_string()
    } else {
        format!("{} (flush failed, may be stale)", summary.total_entities)
    }
}

pub fn segment_info(segments: &[Value]) -> String {
    let rows: Vec<Vec<String>> = segments.iter().map(|s| vec![cell(s)]).collect();
    indexed_table(&["Segment"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_flush_marks_total_as_stale() {
        let mut summary = InsertSummary {
            insert_count: 2,
            total_entities: 10,
            flushed: true,
        };
        let out = insert_summary("car", &summary);
        assert!(out.contains("| 10 "));
        assert!(!out.contains("stale"));

        summary.flushed = false;
        let out = insert_summary("car", &summary);
        assert!(out.contains("10 (flush failed, may be stale)"));
    }

    #[test]
    fn indexed_table_numbers_rows() {
        let out = indexed_table(&["Name"], &[vec!["car".into()], vec!["bike".into()]]);
        assert!(out.contains("Name"));
        assert!(out.contains("| 0 |") || out.contains("| 0 "));
        assert!(out.contains("bike"));
    }

    #[test]
    fn cells_drop_string_quotes() {
        assert_eq!(cell(&json!("red")), "red");
        assert_eq!(cell(&json!(1.5)), "1.5");
        assert_eq!(cell(&json!([1, 2])), "[1,2]");
        assert_eq!(cell(&Value::Null), "");
    }

    #[test]
    fn query_columns_keep_first_seen_order() {
        let rows: Vec<Map<String, Value>> = vec![
            json!({"id": 1}).as_object().unwrap().clone(),
            json!({"id": 2, "color": "red"}).as_object().unwrap().clone(),
        ];
        assert_eq!(query_columns(&rows), vec!["id".to_string(), "color".to_string()]);
        assert!(query_results(&rows).ends_with("Query returned 2 entities."));
    }

    #[test]
    fn search_results_are_numbered_per_query() {
        let hit = SearchHit {
            id: json!(7),
            distance: 0.25,
            fields: Map::new(),
        };
        let out = search_results(&[vec![hit.clone()], vec![hit]]);
        assert!(out.contains("Search result No.1:"));
        assert!(out.contains("Search result No.2:"));
        assert!(out.contains("0.25"));
    }

    #[test]
    fn distance_table_labels_operands() {
        let out = distance_results(&[vec![1.0, -1.0]]);
        assert!(out.contains("left[0]"));
        assert!(out.contains("right[1]"));
        assert!(out.contains("-1"));
    }
}
