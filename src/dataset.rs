use crate::errors::{Error, Result};

/// Longest accepted field value, in bytes
pub const MAX_FIELD_BYTES: usize = 0x1000 - 1;

/// An instance consists of a sequence of items, each a row of input columns
#[derive(Debug, Clone)]
pub struct Instance<'a> {
    /// Number of columns of every item
    n_fields: usize,
    /// Field values, row-major
    fields: Vec<&'a [u8]>,
}

impl<'a> Instance<'a> {
    pub fn with_capacity(n_fields: usize, cap: usize) -> Self {
        Self {
            n_fields,
            fields: Vec::with_capacity(n_fields * cap),
        }
    }

    /// Append an item, validating its shape
    pub fn push<B: AsRef<[u8]>>(&mut self, row: &'a [B]) -> Result<()> {
        let token = self.num_items();
        if row.len() != self.n_fields {
            return Err(Error::decode(
                token,
                format!("expected {} fields, found {}", self.n_fields, row.len()),
            ));
        }
        for (column, field) in row.iter().enumerate() {
            let field = field.as_ref();
            if field.len() > MAX_FIELD_BYTES {
                return Err(Error::decode(
                    token,
                    format!(
                        "field {} is {} bytes long, at most {} are supported",
                        column,
                        field.len(),
                        MAX_FIELD_BYTES
                    ),
                ));
            }
            self.fields.push(field);
        }
        Ok(())
    }

    /// Number of items in the sequence
    pub fn num_items(&self) -> usize {
        if self.n_fields == 0 {
            0
        } else {
            self.fields.len() / self.n_fields
        }
    }

    pub fn n_fields(&self) -> usize {
        self.n_fields
    }

    #[inline]
    pub fn field(&self, item: usize, column: usize) -> &'a [u8] {
        self.fields[item * self.n_fields + column]
    }
}
