/// Header + cell strings exactly as tokenized, before any typing.
/// Only lives for the duration of a parse.
#[derive(Debug, Default)]
pub struct RawTable {
    /// Column names as the source labels them (not the logical field names).
    pub headers: Vec<String>,
    /// Each data row, one String per tokenized cell. Lengths may differ from
    /// `headers`; alignment happens when rows are typed.
    pub rows: Vec<Vec<String>>,
}
