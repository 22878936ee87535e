//! Row cursor over an executed SELECT statement

use crate::driver::ResultHandle;
use crate::statement::Statement;
use crate::value::Row;
use crate::{Error, Result};

/// Iterator over the rows of a SELECT.
///
/// Creating a cursor executes the statement if needed. A statement
/// already performed is rewound; when the driver cannot seek (an
/// unbuffered result set), the statement is re-executed instead.
pub struct Cursor<'a> {
    stmt: &'a mut Statement,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(stmt: &'a mut Statement) -> Result<Self> {
        if let Some(handle) = stmt.cached_handle().filter(|_| stmt.performed()) {
            let rewound = stmt.connection().driver_mut().seek(handle, 0);
            match rewound {
                Ok(()) => {}
                Err(Error::Unsupported { .. }) => {
                    stmt.reset_state();
                    stmt.run()?;
                }
                Err(err) => return Err(err),
            }
        } else {
            stmt.run()?;
        }
        Ok(Self { stmt })
    }

    fn handle(&self) -> Result<ResultHandle> {
        self.stmt
            .cached_handle()
            .ok_or_else(|| Error::invalid_argument("statement produced no result set"))
    }

    /// Move the read position, where the driver supports it
    pub fn seek(&mut self, position: u64) -> Result<()> {
        let handle = self.handle()?;
        self.stmt.connection().driver_mut().seek(handle, position)
    }

    /// Total rows in the result set, where the driver can count them
    pub fn row_count(&mut self) -> Result<u64> {
        let handle = self.handle()?;
        self.stmt.connection().driver_mut().row_count(handle)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = match self.handle() {
            Ok(handle) => handle,
            Err(err) => return Some(Err(err)),
        };
        self.stmt
            .connection()
            .driver_mut()
            .fetch_row(handle)
            .transpose()
    }
}
