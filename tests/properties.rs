use milvus_cli::{
    csv_io::{self, CsvTable, SilentProgress},
    types::{build_params_for, FieldDataType, IndexType},
    validation::{validate_collection_parameter, validate_index_parameter},
    ParameterError,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn field_strategy() -> impl Strategy<Value = (FieldDataType, String)> {
    (0..FieldDataType::ALL.len(), 1u32..4096, "[a-z ]{0,12}").prop_map(|(idx, dim, desc)| {
        let data_type = FieldDataType::ALL[idx];
        let extra = if data_type.is_vector() {
            dim.to_string()
        } else {
            desc
        };
        (data_type, extra)
    })
}

fn unique_fields() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(field_strategy(), 1..6).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (data_type, extra))| format!("f{}:{}:{}", i, data_type, extra))
            .collect()
    })
}

fn cell_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-zA-Z0-9 ,\"]{0,10}".prop_map(|s| json!(s)),
        prop::collection::vec(-1000i32..1000, 0..4).prop_map(|v| json!(v)),
        Just(Value::Null),
    ]
}

proptest! {
    #[test]
    fn collection_fields_round_trip(fields in unique_fields()) {
        let spec = validate_collection_parameter("car", "f0", &fields).unwrap();
        let rendered: Vec<String> = spec.fields.iter().map(|f| f.to_string()).collect();
        prop_assert_eq!(&rendered, &fields);

        let reparsed = validate_collection_parameter("car", "f0", &rendered).unwrap();
        prop_assert_eq!(reparsed, spec);
    }

    #[test]
    fn repeated_names_always_fail(fields in unique_fields(), at in any::<prop::sample::Index>()) {
        let mut fields = fields;
        let copy = fields[at.index(fields.len())].clone();
        let pos = at.index(fields.len() + 1);
        fields.insert(pos, copy);
        prop_assert_eq!(
            validate_collection_parameter("car", "f0", &fields),
            Err(ParameterError::DuplicateFieldNames)
        );
    }

    #[test]
    fn index_params_follow_the_build_table(type_idx in 0..IndexType::ALL.len(), value in any::<i32>()) {
        let index_type = IndexType::ALL[type_idx];
        let own = build_params_for(index_type);

        let params: Vec<String> = own.iter().map(|name| format!("{}:{}", name, value)).collect();
        let spec = validate_index_parameter(index_type.as_str(), "L2", &params).unwrap();
        prop_assert_eq!(spec.params.len(), own.len());

        for other in IndexType::ALL {
            for foreign in build_params_for(other).difference(own) {
                let result = validate_index_parameter(
                    index_type.as_str(),
                    "L2",
                    &[format!("{}:{}", foreign, value)],
                );
                let is_unknown = matches!(result, Err(ParameterError::UnknownIndexParam { .. }));
                prop_assert!(is_unknown);
            }
        }

        if let Some(name) = own.iter().next() {
            let result = validate_index_parameter(index_type.as_str(), "L2", &[format!("{}:1.5", name)]);
            let is_non_integer = matches!(result, Err(ParameterError::NonIntegerParamValue { .. }));
            prop_assert!(is_non_integer);
        }
    }

    #[test]
    fn csv_write_then_read_reproduces_table(
        width in 1usize..5,
        height in 0usize..6,
        cells in prop::collection::vec(cell_strategy(), 25..26),
    ) {
        let columns: Vec<String> = (0..width).map(|c| format!("col_{}", c)).collect();
        let rows: Vec<Vec<Value>> = (0..height)
            .map(|r| (0..width).map(|c| cells[(r * width + c) % cells.len()].clone()).collect())
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let written = csv_io::write_csv_file(&path, &rows, &columns, &SilentProgress).unwrap();
        prop_assert_eq!(written, height);

        let table = csv_io::read_local_csv(&path, true, &SilentProgress).unwrap();
        let expected = CsvTable {
            columns: columns.clone(),
            data: (0..width).map(|c| rows.iter().map(|row| row[c].clone()).collect()).collect(),
        };
        prop_assert_eq!(table, expected);
    }
}
