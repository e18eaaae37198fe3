/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! User interface things shared between the CLI and anything embedding the
//! library.

use crate::sysex::roland::validate_and_unwrap;
use crate::sysex::{format_bytes, parse_sysex, split_sysex_stream};
use std::fmt::Arguments;

// Utilities

/// Generic way to present a table of data (e.g. a list of SysEx messages) to
/// the user.
pub trait TableStream {
    /// Output a cell for a table heading to the current row (HTML `<th>`).
    fn th(&mut self, c: Arguments);
    /// Output a normal cell to the current row (HTML `<td>`).
    fn td(&mut self, c: Arguments);
    /// End the current row (HTML `<tr>`). New cells will go in the next row.
    /// This must always be called after pushing the cells for the current row.
    fn end_tr(&mut self);
}

pub struct StderrTableStream {
    first_cell: bool,
}
impl StderrTableStream {
    #[allow(clippy::new_without_default)]
    pub fn new() -> StderrTableStream {
        StderrTableStream { first_cell: true }
    }
}
impl TableStream for StderrTableStream {
    fn th(&mut self, c: Arguments) {
        self.td(c)
    }
    fn td(&mut self, c: Arguments) {
        if self.first_cell {
            self.first_cell = false;
        } else {
            eprint!("\t");
        }
        eprint!("{}", c);
    }
    fn end_tr(&mut self) {
        eprintln!();
        self.first_cell = true;
    }
}

/// Tab-separated rows appended to a [String].
pub struct StringTableStream<'a> {
    string: &'a mut String,
    first_cell: bool,
}
impl StringTableStream<'_> {
    pub fn new(string: &mut String) -> StringTableStream {
        StringTableStream {
            string,
            first_cell: true,
        }
    }
}
impl TableStream for StringTableStream<'_> {
    fn th(&mut self, c: Arguments) {
        self.td(c)
    }
    fn td(&mut self, c: Arguments) {
        use std::fmt::Write;

        if self.first_cell {
            self.first_cell = false;
        } else {
            self.string.push('\t');
        }
        // Can't fail when writing to a String.
        write!(self.string, "{}", c).unwrap();
    }
    fn end_tr(&mut self) {
        self.string.push('\n');
        self.first_cell = true;
    }
}

#[cfg(test)]
#[test]
fn test_string_table_stream() {
    let mut buf = String::new();
    let mut stream = StringTableStream::new(&mut buf);
    stream.th(format_args!("foo"));
    stream.th(format_args!("bar"));
    stream.end_tr();
    stream.td(format_args!("foo1"));
    stream.td(format_args!("bar1"));
    stream.end_tr();
    assert_eq!(buf, "foo\tbar\nfoo1\tbar1\n");
}

// UI entry-points

/// Lists every SysEx in a `.syx`-style stream, with an interpretation and
/// whether it would be accepted as a JD-Xi data set.
pub fn list_sysex_messages(table_stream: &mut impl TableStream, stream: &[u8]) {
    table_stream.th(format_args!("#"));
    table_stream.th(format_args!("Size"));
    table_stream.th(format_args!("Interpretation"));
    table_stream.th(format_args!("JD-Xi DT1 check"));
    table_stream.end_tr();

    for (i, bytes) in split_sysex_stream(stream).into_iter().enumerate() {
        table_stream.td(format_args!("{}", i));
        table_stream.td(format_args!("{}", bytes.len()));
        match parse_sysex(bytes) {
            Ok(sysex) => table_stream.td(format_args!("SysEx: {}", sysex)),
            Err(err) => table_stream.td(format_args!("{:?}: {}", err, format_bytes(bytes))),
        }
        match validate_and_unwrap(bytes) {
            Ok(_) => table_stream.td(format_args!("OK")),
            Err(err) => table_stream.td(format_args!("{}", err)),
        }
        table_stream.end_tr();
    }
}
