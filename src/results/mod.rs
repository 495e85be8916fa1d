mod row;

pub use row::{DataRecord, RecordSchema};
