use crate::confirm::{Confirm, Outcome, Prompt};
use crate::options::{group_options, no_category_option, top_options};
use crate::types::{DropdownOption, GroupedOption, OptionType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// One editable line of the options editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRow {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_label: Option<String>,
    #[serde(default)]
    pub is_sub_option: bool,
}

impl OptionRow {
    /// Rows without a category, or with an empty one, are parents.
    pub fn is_top_level(&self) -> bool {
        self.category.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowField {
    Value,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowError {
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub index: usize,
    pub field: RowField,
    pub error: RowError,
}

fn normalize(category: Option<String>) -> Option<String> {
    category.filter(|c| !c.is_empty())
}

/// Editor state for one option taxonomy (activities or districts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsForm {
    pub option_type: OptionType,
    // options as loaded, for change detection
    pub original: Vec<GroupedOption>,
    pub rows: Vec<OptionRow>,
    pub top_options: Vec<GroupedOption>,
    #[serde(default)]
    pub added_index: Option<usize>,
}

impl OptionsForm {
    pub fn new(option_type: OptionType, options: &[DropdownOption]) -> Self {
        let original = group_options(options);
        let rows = original
            .iter()
            .filter_map(|o| {
                Some(OptionRow {
                    value: o.value.clone()?,
                    label: o.label.clone(),
                    category: o.category.clone(),
                    category_label: o.category_label.clone(),
                    is_sub_option: o.category.is_some(),
                })
            })
            .collect();
        Self {
            option_type,
            top_options: top_options(&original),
            original,
            rows,
            added_index: None,
        }
    }

    /// Browser location of this editor, replaced in history without navigating.
    pub fn history_path(&self, root_path: &str) -> String {
        format!("{}/options-form/{}", root_path.trim_end_matches('/'), self.option_type)
    }

    pub fn row(&self, index: usize) -> Option<&OptionRow> {
        self.rows.get(index)
    }

    pub fn position_of(&self, value: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.value == value)
    }

    fn category_label(&self, category: &str) -> Option<String> {
        self.top_options
            .iter()
            .find(|o| o.value.as_deref() == Some(category))
            .map(|o| o.label.clone())
    }

    /// Inserts an empty row under `category` and marks it as just added.
    pub fn add_option(&mut self, index: usize, category: Option<String>) -> usize {
        let category = normalize(category);
        let index = index.min(self.rows.len());
        let row = OptionRow {
            value: Uuid::new_v4().to_string(),
            label: String::new(),
            category_label: category.as_deref().and_then(|c| self.category_label(c)),
            is_sub_option: category.is_some(),
            category,
        };
        self.rows.insert(index, row);
        self.added_index = Some(index);
        index
    }

    fn remove_prompt(&self) -> Prompt {
        Prompt::new(
            "Löschen?",
            format!(
                "Möchten Sie diese Option wirklich löschen? Wenn Sie die Werte der Optionen \
                 verändern oder löschen, kann dies zu fehlerhaften Zuordnungen von Vereinen zu {} führen!",
                self.option_type.assignment_noun()
            ),
        )
    }

    fn category_prompt(&self) -> Prompt {
        Prompt::new(
            "Achtung!",
            format!(
                "Wenn Sie eine Unterkategorie in eine übergeordnete Kategorie abändern oder eine \
                 übergeordnete Kategorie in eine Unterkategorie verwandeln, kann dies zu \
                 fehlerhaften Zuordnungen von {} führen!",
                self.option_type.assignment_noun()
            ),
        )
    }

    pub fn remove(&mut self, index: usize, confirm: &dyn Confirm) -> Outcome {
        if index >= self.rows.len() {
            return Outcome::Unchanged;
        }
        let prompt = self.remove_prompt();
        if !confirm.confirm(&prompt) {
            return Outcome::Declined { prompt };
        }
        self.added_index = None;
        self.rows.remove(index);
        Outcome::Applied
    }

    /// Moves a row under another category. Turning a parent into a child or the other way
    /// round needs confirmation and re-validates every category reference.
    pub fn change_category(
        &mut self,
        index: usize,
        new_category: Option<String>,
        confirm: &dyn Confirm,
    ) -> Outcome {
        let new_category = normalize(new_category);
        let Some(row) = self.rows.get(index) else {
            return Outcome::Unchanged;
        };
        let old_category = normalize(row.category.clone());
        if new_category == old_category {
            return Outcome::Unchanged;
        }

        if new_category.is_none() || old_category.is_none() {
            let prompt = self.category_prompt();
            if !confirm.confirm(&prompt) {
                return Outcome::Declined { prompt };
            }
            let row = &mut self.rows[index];
            row.is_sub_option = new_category.is_some();
            row.category = new_category;

            self.recalculate_top_options();
            self.delete_invalid_top_options();
            self.recalculate_top_options();
        } else {
            self.rows[index].category = new_category;
        }

        self.sort_rows();
        Outcome::Applied
    }

    /// Rebuilds the top options from the rows that currently have no category.
    pub fn recalculate_top_options(&mut self) {
        self.top_options = std::iter::once(no_category_option())
            .chain(
                self.rows
                    .iter()
                    .filter(|r| normalize(r.category.clone()).is_none())
                    .map(|r| GroupedOption {
                        value: Some(r.value.clone()),
                        label: r.label.clone(),
                        category: None,
                        category_label: None,
                        is_sub_option: false,
                    }),
            )
            .collect();
    }

    /// Resets category references that no longer name a top option.
    pub fn delete_invalid_top_options(&mut self) {
        let top_values: Vec<Option<String>> =
            self.top_options.iter().map(|o| o.value.clone()).collect();
        for row in &mut self.rows {
            if !top_values.contains(&normalize(row.category.clone())) {
                row.category = None;
                row.is_sub_option = false;
            }
        }
    }

    fn sort_label(&self, row: &OptionRow) -> String {
        match row.category.as_deref().filter(|_| !row.is_top_level()) {
            Some(category) => self
                .rows
                .iter()
                .find(|r| r.value == category && r.is_top_level())
                .map(|r| r.label.clone())
                .unwrap_or_else(|| row.label.clone()),
            None => row.label.clone(),
        }
    }

    /// Orders rows by category label, parents before children, then label.
    pub fn sort_rows(&mut self) {
        let labels: Vec<String> = self.rows.iter().map(|r| self.sort_label(r)).collect();
        let mut keyed: Vec<(String, OptionRow)> = labels.into_iter().zip(self.rows.drain(..)).collect();
        keyed.sort_by(|(la, a), (lb, b)| {
            la.cmp(lb)
                .then_with(|| match (a.is_top_level(), b.is_top_level()) {
                    (false, true) => Ordering::Greater,
                    (true, false) => Ordering::Less,
                    _ => Ordering::Equal,
                })
                .then_with(|| a.label.cmp(&b.label))
        });
        self.rows = keyed
            .into_iter()
            .map(|(label, mut row)| {
                row.category = normalize(row.category.take());
                row.is_sub_option = row.category.is_some();
                row.category_label = row.category.as_ref().map(|_| label);
                row
            })
            .collect();
    }

    fn normalized(entries: impl Iterator<Item = (String, String, Option<String>)>) -> Vec<(String, String, Option<String>)> {
        let mut entries: Vec<_> = entries.map(|(v, l, c)| (v, l, normalize(c))).collect();
        entries.sort();
        entries
    }

    /// Whether the rows differ from what was loaded, ignoring order.
    pub fn has_changed(&self) -> bool {
        let before = Self::normalized(self.original.iter().filter_map(|o| {
            Some((o.value.clone()?, o.label.clone(), o.category.clone()))
        }));
        let after = Self::normalized(
            self.rows
                .iter()
                .map(|r| (r.value.clone(), r.label.clone(), r.category.clone())),
        );
        before != after
    }

    /// Whether a reset or navigation may throw the current edits away.
    pub fn may_discard(&self, confirm: &dyn Confirm) -> bool {
        !self.has_changed() || confirm.confirm(&Prompt::discard_changes())
    }

    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (index, row) in self.rows.iter().enumerate() {
            if row.value.trim().is_empty() {
                errors.push(FieldError {
                    index,
                    field: RowField::Value,
                    error: RowError::Required,
                });
            }
            if row.label.trim().is_empty() {
                errors.push(FieldError {
                    index,
                    field: RowField::Label,
                    error: RowError::Required,
                });
            }
        }
        errors
    }

    /// Never faults on indexes outside the form.
    pub fn has_error(&self, index: usize, field: RowField, error: RowError) -> bool {
        self.validate()
            .iter()
            .any(|e| e.index == index && e.field == field && e.error == error)
    }

    /// Full replacement payload: top-level entries first, otherwise in row order.
    pub fn submit_payload(&self) -> Vec<DropdownOption> {
        let mut options: Vec<DropdownOption> = self
            .rows
            .iter()
            .map(|r| DropdownOption {
                value: r.value.clone(),
                label: r.label.clone(),
                category: normalize(r.category.clone()),
            })
            .collect();
        options.sort_by_key(|o| o.category.is_some());
        options
    }
}
