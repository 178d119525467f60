//! Collaborator interfaces consumed by the engine, plus an in-memory backend.

use crate::error::StoreError;
use crate::types::{Field, Form, FormId, Record, Report};
use std::collections::BTreeMap;

pub trait FormCatalog {
    fn list_active_forms(&self) -> Result<Vec<Form>, StoreError>;
    fn list_fields(&self, form_id: &str, include_archived: bool) -> Result<Vec<Field>, StoreError>;
}

pub trait RecordStore {
    /// Records of the given forms, optionally restricted to one site.
    fn query_records(
        &self,
        form_ids: &[FormId],
        site_filter: Option<&str>,
    ) -> Result<Vec<Record>, StoreError>;
}

pub trait ReportStore {
    fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    forms: Vec<Form>,
    records: Vec<Record>,
    reports: BTreeMap<String, Report>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_form(&mut self, form: Form) {
        self.forms.retain(|f| f.id != form.id);
        self.forms.push(form);
    }

    /// Appends a record. Records are never updated in place.
    pub fn append_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn insert_report(&mut self, report: Report) {
        self.reports.insert(report.id.clone(), report);
    }

    /// Deletes a form together with every record submitted against it.
    pub fn delete_form(&mut self, form_id: &str) {
        self.forms.retain(|f| f.id != form_id);
        self.records.retain(|r| r.form_id != form_id);
    }

    #[cfg(test)]
    pub(crate) fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl FormCatalog for MemoryStore {
    fn list_active_forms(&self) -> Result<Vec<Form>, StoreError> {
        Ok(self.forms.iter().filter(|f| f.is_live()).cloned().collect())
    }

    fn list_fields(&self, form_id: &str, include_archived: bool) -> Result<Vec<Field>, StoreError> {
        Ok(self
            .forms
            .iter()
            .find(|f| f.id == form_id)
            .map(|form| {
                form.fields
                    .iter()
                    .filter(|field| include_archived || field.active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl RecordStore for MemoryStore {
    fn query_records(
        &self,
        form_ids: &[FormId],
        site_filter: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| form_ids.contains(&r.form_id))
            .filter(|r| site_filter.map_or(true, |site| r.site_id == site))
            .cloned()
            .collect())
    }
}

impl ReportStore for MemoryStore {
    fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(report_id).cloned())
    }
}
