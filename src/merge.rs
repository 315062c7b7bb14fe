use std::collections::HashMap;

use crate::record::{IdentityKey, PlayerRecord};

/// One record per `(full_name, club)`. A later record replaces an earlier one
/// with the same key but keeps the earlier one's position in the output.
pub fn merge(records: Vec<PlayerRecord>) -> Vec<PlayerRecord> {
    let mut slots: HashMap<IdentityKey, usize> = HashMap::with_capacity(records.len());
    let mut merged: Vec<PlayerRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slots.get(&record.identity()) {
            Some(&i) => merged[i] = record,
            None => {
                slots.insert(record.identity(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}
