// Data record coalescing.
//
// Merges runs of address-contiguous data records into single records:
//   - Non-data records close the open run and pass through in place
//   - Contiguity is checked in 64-bit space, so a run never wraps past 4 GiB
//   - Merged records use the widest data type seen in the input
//   - Runs that carry no bytes are dropped
//
// Merged payloads are not split back to the per-line limit; they describe
// memory blocks, not framed lines.

use log::debug;

use crate::record::{Record, RecordType};

/// An open run of contiguous data.
struct Run {
    base: u32,
    next: u64,
    data: Vec<u8>,
}

impl Run {
    fn start(record: &Record) -> Self {
        Self {
            base: record.address,
            next: record.end_address(),
            data: record.payload.clone(),
        }
    }

    /// Close the run, appending it to `out` unless it is empty.
    fn finish(self, kind: RecordType, out: &mut Vec<Record>) {
        if !self.data.is_empty() {
            out.push(Record::new(kind, self.base, self.data));
        }
    }
}

/// Widest data record type present, if any.
fn preferred_data_type(records: &[Record]) -> Option<RecordType> {
    records
        .iter()
        .filter(|r| r.is_data())
        .map(|r| r.kind)
        .max_by_key(|k| k.address_width())
}

/// Merge address-contiguous data records.
///
/// Output preserves the relative order of all non-data records and the
/// program order of data. Applying it twice gives the same result as once.
pub fn coalesce(records: &[Record]) -> Vec<Record> {
    let Some(data_type) = preferred_data_type(records) else {
        return records.to_vec();
    };

    let mut out = Vec::with_capacity(records.len());
    let mut run: Option<Run> = None;
    let mut ix = 0;

    while ix < records.len() {
        let record = &records[ix];

        if !record.is_data() {
            if let Some(done) = run.take() {
                done.finish(data_type, &mut out);
            }
            out.push(record.clone());
            ix += 1;
            continue;
        }

        // A discontiguous record closes the run and is looked at again with
        // no run open.
        let mut reenter = false;
        match run.as_mut() {
            None => run = Some(Run::start(record)),
            Some(open) if u64::from(record.address) == open.next => {
                open.data.extend_from_slice(&record.payload);
                open.next += record.payload.len() as u64;
            }
            Some(_) => reenter = true,
        }

        if reenter {
            if let Some(done) = run.take() {
                done.finish(data_type, &mut out);
            }
        } else {
            ix += 1;
        }
    }

    if let Some(done) = run.take() {
        done.finish(data_type, &mut out);
    }

    debug!("coalesced {} records into {}", records.len(), out.len());
    out
}
