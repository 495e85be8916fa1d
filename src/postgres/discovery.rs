use tokio_postgres::Client;

use crate::command::Parameter;
use crate::error::SqlFacadeError;
use crate::types::{DbType, ParameterDirection};

const ROUTINE_PARAMETERS: &str = "\
SELECT r.specific_name::text AS specific_name, r.routine_type::text AS routine_type,
       r.data_type::text AS return_type, p.parameter_name::text AS parameter_name,
       p.parameter_mode::text AS parameter_mode, p.data_type::text AS data_type,
       p.character_maximum_length::int AS character_maximum_length,
       p.numeric_precision::int AS numeric_precision, p.numeric_scale::int AS numeric_scale
FROM information_schema.routines r
LEFT JOIN information_schema.parameters p
  ON p.specific_schema = r.specific_schema AND p.specific_name = r.specific_name
WHERE r.routine_name::text = $1::text
  AND (($2::text IS NULL AND r.routine_schema::text = ANY (current_schemas(false)::text[]))
       OR r.routine_schema::text = $2::text)
ORDER BY r.specific_name, p.ordinal_position";

/// Look up the parameters of `name` (optionally `schema.name`) in `information_schema`.
///
/// Overloads resolve to the first specific routine. Functions with a non-void result get a
/// leading `@return_value` parameter.
///
/// # Errors
/// Returns `InvalidArgument` when no such routine is visible.
pub(crate) async fn routine_parameters(
    client: &Client,
    name: &str,
) -> Result<Vec<Parameter>, SqlFacadeError> {
    let (schema, routine) = match name.rsplit_once('.') {
        Some((schema, routine)) => (Some(schema.to_string()), routine.to_string()),
        None => (None, name.to_string()),
    };
    let rows = client.query(ROUTINE_PARAMETERS, &[&routine, &schema]).await?;
    let Some(first) = rows.first() else {
        return Err(SqlFacadeError::InvalidArgument(format!(
            "stored procedure '{name}' not found"
        )));
    };
    let specific: String = first.try_get("specific_name")?;
    let routine_type: Option<String> = first.try_get("routine_type")?;
    let return_type: Option<String> = first.try_get("return_type")?;

    let mut parameters = Vec::new();
    if routine_type.as_deref() == Some("FUNCTION")
        && let Some(ret) = return_type.as_deref()
        && ret != "void"
    {
        parameters.push(
            Parameter::new("@return_value", db_type_of(ret))
                .direction(ParameterDirection::ReturnValue),
        );
    }

    let mut ordinal = 0;
    for row in rows.iter().filter(|r| {
        r.try_get::<_, String>("specific_name")
            .is_ok_and(|s| s == specific)
    }) {
        let Some(mode) = row.try_get::<_, Option<String>>("parameter_mode")? else {
            continue;
        };
        ordinal += 1;
        let direction = match mode.as_str() {
            "OUT" => ParameterDirection::Output,
            "INOUT" => ParameterDirection::InputOutput,
            _ => ParameterDirection::Input,
        };
        // Table-function result columns are not call parameters.
        if mode == "OUT" && routine_type.as_deref() == Some("FUNCTION") {
            continue;
        }
        let label = row
            .try_get::<_, Option<String>>("parameter_name")?
            .unwrap_or_else(|| format!("p{ordinal}"));
        let data_type: Option<String> = row.try_get("data_type")?;
        let mut parameter = Parameter::new(
            format!("@{label}"),
            data_type.as_deref().map_or(DbType::Object, db_type_of),
        )
        .direction(direction);
        if let Some(len) = row.try_get::<_, Option<i32>>("character_maximum_length")?
            && let Ok(len) = u32::try_from(len)
        {
            parameter = parameter.size(len);
        }
        let precision = row.try_get::<_, Option<i32>>("numeric_precision")?;
        let scale = row.try_get::<_, Option<i32>>("numeric_scale")?;
        if let (Some(p), Some(s)) = (precision, scale) {
            parameter = parameter.precision_scale(
                u8::try_from(p).unwrap_or(u8::MAX),
                u8::try_from(s).unwrap_or(u8::MAX),
            );
        }
        parameters.push(parameter);
    }
    Ok(parameters)
}

/// Map an `information_schema` data type name onto a [`DbType`].
pub(crate) fn db_type_of(data_type: &str) -> DbType {
    match data_type {
        "smallint" => DbType::Int16,
        "integer" => DbType::Int32,
        "bigint" => DbType::Int64,
        "numeric" => DbType::Decimal,
        "real" => DbType::Single,
        "double precision" => DbType::Double,
        "boolean" => DbType::Boolean,
        "text" | "character varying" | "character" | "name" => DbType::String,
        "date" => DbType::Date,
        "uuid" => DbType::Guid,
        "json" | "jsonb" => DbType::Json,
        "bytea" => DbType::Binary,
        t if t.starts_with("timestamp") => DbType::DateTime,
        t if t.starts_with("time") => DbType::Time,
        _ => DbType::Object,
    }
}
