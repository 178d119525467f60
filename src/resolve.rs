//! Field reconciliation across forms.
//!
//! The same logical field may carry a different id in every form, and legacy
//! rows may be keyed by display name instead of id. A field is therefore read
//! by probing an ordered list of candidate keys, first match wins.

use crate::types::{Field, FormId, Record};
use crate::value::Scalar;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub type RowObject = Map<String, JsonValue>;

/// Field catalog of one participating form, archived fields included.
#[derive(Debug, Clone, PartialEq)]
pub struct FormFields {
    pub form_id: FormId,
    pub fields: Vec<Field>,
}

impl FormFields {
    pub fn field_by_id(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.active)
            .or_else(|| self.fields.iter().find(|f| f.name == name))
    }
}

/// A field located in the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRef<'a> {
    pub form_id: &'a str,
    pub field: &'a Field,
}

/// Candidate keys for a display name: the name itself, then every id carried
/// by a same-named field in the participating forms, in form order.
pub fn candidate_keys(field_name: &str, forms: &[FormFields]) -> Vec<String> {
    let mut keys = vec![field_name.to_string()];
    for form in forms {
        for field in form.fields.iter().filter(|f| f.name == field_name) {
            if !keys.contains(&field.id) {
                keys.push(field.id.clone());
            }
        }
    }
    keys
}

/// Per-execution resolver; results are memoized by display name.
#[derive(Debug)]
pub struct FieldResolver<'a> {
    forms: &'a [FormFields],
    memo: HashMap<String, Arc<[String]>>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(forms: &'a [FormFields]) -> Self {
        Self {
            forms,
            memo: HashMap::new(),
        }
    }

    pub fn forms(&self) -> &'a [FormFields] {
        self.forms
    }

    pub fn resolve(&mut self, field_name: &str) -> Arc<[String]> {
        if let Some(keys) = self.memo.get(field_name) {
            return Arc::clone(keys);
        }
        let keys: Arc<[String]> = candidate_keys(field_name, self.forms).into();
        self.memo.insert(field_name.to_string(), Arc::clone(&keys));
        keys
    }

    /// Candidate keys restricted to one form: display name, the declared id,
    /// then ids of same-named (typically archived) fields of that form.
    pub fn resolve_in_form(&self, form_id: &str, field_id: &str, field_name: &str) -> Vec<String> {
        let mut keys = vec![field_name.to_string(), field_id.to_string()];
        if let Some(form) = self.form(form_id) {
            for field in form.fields.iter().filter(|f| f.name == field_name) {
                if !keys.contains(&field.id) {
                    keys.push(field.id.clone());
                }
            }
        }
        keys.dedup();
        keys
    }

    pub fn form(&self, form_id: &str) -> Option<&'a FormFields> {
        self.forms.iter().find(|f| f.form_id == form_id)
    }

    /// Finds a field by id first, then by display name, across all forms.
    pub fn lookup(&self, reference: &str) -> Option<FieldRef<'a>> {
        let by_id = self.forms.iter().find_map(|form| {
            form.field_by_id(reference).map(|field| FieldRef {
                form_id: &form.form_id,
                field,
            })
        });
        by_id.or_else(|| {
            self.forms.iter().find_map(|form| {
                form.field_by_name(reference).map(|field| FieldRef {
                    form_id: &form.form_id,
                    field,
                })
            })
        })
    }

    #[cfg(test)]
    pub(crate) fn memo_len(&self) -> usize {
        self.memo.len()
    }
}

/// Reads the first non-blank candidate. `Err` carries the key whose value is
/// a nested array/object and so cannot be read as a scalar.
pub fn probe(row: &RowObject, keys: &[String]) -> Result<Scalar, String> {
    for key in keys {
        let Some(raw) = row.get(key) else {
            continue;
        };
        let value = Scalar::from_json(raw).ok_or_else(|| key.clone())?;
        if !value.is_blank() {
            return Ok(value);
        }
    }
    Ok(Scalar::Missing)
}

/// Row keys that neither the record's field snapshot nor the live form
/// definition can explain.
pub fn unresolved_keys(record: &Record, live_fields: &[Field]) -> BTreeSet<String> {
    let known: BTreeSet<&str> = record
        .field_snapshot
        .iter()
        .chain(live_fields)
        .flat_map(|f| [f.id.as_str(), f.name.as_str()])
        .collect();
    record
        .batch_rows
        .iter()
        .filter_map(JsonValue::as_object)
        .flat_map(|row| row.keys())
        .filter(|key| !known.contains(key.as_str()))
        .cloned()
        .collect()
}
