/// Arrow schema definitions for user records at each pipeline stage.
pub mod users {
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    use crate::config::PipelineConfig;
    use crate::field::{self, USER_FIELDS};

    /// Canonical raw layout: every column as nullable text.
    ///
    /// The flagger accepts any column types; this is what a text source
    /// (CSV, seed table) naturally produces.
    pub fn raw_schema() -> Schema {
        Schema::new(
            USER_FIELDS
                .iter()
                .map(|r| Field::new(r.name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        )
    }

    /// Flagged layout: typed columns (all nullable), the anomaly flag, and
    /// the original text of every cast column and of the e-mail.
    pub fn flagged_schema() -> Schema {
        let mut fields: Vec<Field> = USER_FIELDS
            .iter()
            .map(|r| Field::new(r.name, r.kind.data_type(), true))
            .collect();
        fields.push(Field::new(field::IS_ANOMALOUS, DataType::Boolean, false));
        fields.extend(
            USER_FIELDS
                .iter()
                .filter_map(|r| r.raw_column)
                .map(|name| Field::new(name, DataType::Utf8, true)),
        );
        Schema::new(fields)
    }

    /// Contracted layout: nullability follows the config's required list.
    pub fn contracted_schema(config: &PipelineConfig) -> Schema {
        Schema::new(
            USER_FIELDS
                .iter()
                .map(|r| Field::new(r.name, r.kind.data_type(), !config.is_required(r.name)))
                .collect::<Vec<_>>(),
        )
    }

    /// Quarantine layout: the flagged columns plus where the row came from
    /// and why it was routed out.
    pub fn rejected_schema() -> Schema {
        let mut fields: Vec<Field> = flagged_schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.extend(rejection_fields());
        Schema::new(fields)
    }

    /// Columns appended to a flagged batch when rows are quarantined.
    pub fn rejection_fields() -> [Field; 2] {
        [
            Field::new(field::ROW_INDEX, DataType::UInt64, false),
            Field::new(field::REJECTION_REASON, DataType::Utf8, false),
        ]
    }

    /// Audit log of anomalous records and why they were flagged.
    pub fn anomaly_log_schema() -> Schema {
        Schema::new(vec![
            Field::new(field::ROW_INDEX, DataType::UInt64, false),
            Field::new("anomalous_user_id", DataType::Int32, true),
            Field::new(
                "original_creation_date",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("remediation_action", DataType::Utf8, false),
            Field::new("id_invalid", DataType::Boolean, false),
            Field::new("phone_invalid", DataType::Boolean, false),
            Field::new("birth_date_invalid", DataType::Boolean, false),
            Field::new("created_at_invalid", DataType::Boolean, false),
            Field::new("status_invalid", DataType::Boolean, false),
            Field::new("email_invalid", DataType::Boolean, false),
            Field::new("age_invalid", DataType::Boolean, false),
            Field::new("raw_email", DataType::Utf8, true),
            Field::new("raw_phone", DataType::Utf8, true),
        ])
    }
}
