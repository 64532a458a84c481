use crate::confirm::{Confirm, Outcome, Prompt};
use crate::types::{Association, Contact, DropdownOption, Image, Link, SocialMediaLink, TextBlock};
use serde::{Deserialize, Serialize};

/// Repeatable row groups of the association editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Contacts,
    Links,
    SocialMedia,
    Images,
}

impl Section {
    fn noun(&self) -> &'static str {
        match self {
            Section::Contacts => "diesen Kontakt",
            Section::Links => "diesen Link",
            Section::SocialMedia => "diesen Social-Media-Link",
            Section::Images => "dieses Bild",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: &str) -> Self {
        Self {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

// Row vectors differ in type, this dispatches the generic list edits to the right one
macro_rules! with_rows {
    ($association:expr, $section:expr, |$rows:ident| $body:expr) => {
        match $section {
            Section::Contacts => {
                let $rows = &mut $association.contacts;
                $body
            }
            Section::Links => {
                let $rows = &mut $association.links;
                $body
            }
            Section::SocialMedia => {
                let $rows = &mut $association.social_media;
                $body
            }
            Section::Images => {
                let $rows = &mut $association.images;
                $body
            }
        }
    };
}

fn insert_default<T: Default>(rows: &mut Vec<T>, index: usize) -> usize {
    let index = index.min(rows.len());
    rows.insert(index, T::default());
    index
}

fn move_row<T>(rows: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= rows.len() || to >= rows.len() || from == to {
        return false;
    }
    let row = rows.remove(from);
    rows.insert(to, row);
    true
}

fn blank_to_none(field: &mut Option<String>) {
    if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
        *field = None;
    }
}

/// Editor state for a single association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationForm {
    pub original: Association,
    pub current: Association,
}

impl AssociationForm {
    pub fn new(association: Association) -> Self {
        Self {
            original: association.clone(),
            current: association,
        }
    }

    /// Empty form for a new association with a fresh id.
    pub fn blank() -> Self {
        Self::new(Association {
            id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        })
    }

    pub fn row_count(&self, section: Section) -> usize {
        match section {
            Section::Contacts => self.current.contacts.len(),
            Section::Links => self.current.links.len(),
            Section::SocialMedia => self.current.social_media.len(),
            Section::Images => self.current.images.len(),
        }
    }

    pub fn add_row(&mut self, section: Section, index: usize) -> usize {
        with_rows!(self.current, section, |rows| insert_default(rows, index))
    }

    pub fn remove_row(&mut self, section: Section, index: usize, confirm: &dyn Confirm) -> Outcome {
        if index >= self.row_count(section) {
            return Outcome::Unchanged;
        }
        let prompt = Prompt::new(
            "Löschen?",
            format!("Möchten Sie {} wirklich löschen?", section.noun()),
        );
        if !confirm.confirm(&prompt) {
            return Outcome::Declined { prompt };
        }
        with_rows!(self.current, section, |rows| {
            rows.remove(index);
        });
        Outcome::Applied
    }

    pub fn move_row(&mut self, section: Section, from: usize, to: usize) -> bool {
        with_rows!(self.current, section, |rows| move_row(rows, from, to))
    }

    /// Keeps only values present in `options`, in the given order, without duplicates.
    pub fn set_districts(&mut self, values: Vec<String>, options: &[DropdownOption]) {
        self.current.district_list = known_values(values, options);
    }

    pub fn set_activities(&mut self, values: Vec<String>, options: &[DropdownOption]) {
        self.current.activity_list = known_values(values, options);
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let a = &self.current;
        let mut errors = Vec::new();
        if a.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "Name ist erforderlich"));
        }
        if !(-90.0..=90.0).contains(&a.lat) {
            errors.push(ValidationError::new("lat", "Breitengrad muss zwischen -90 und 90 liegen"));
        }
        if !(-180.0..=180.0).contains(&a.lng) {
            errors.push(ValidationError::new("lng", "Längengrad muss zwischen -180 und 180 liegen"));
        }
        let urls = a
            .links
            .iter()
            .map(|l| ("links", &l.url))
            .chain(a.social_media.iter().map(|s| ("socialMedia", &s.url)))
            .chain(a.images.iter().map(|i| ("images", &i.url)));
        let mut counters = std::collections::HashMap::new();
        for (section, url) in urls {
            let index = counters.entry(section).or_insert(0usize);
            if url.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("{}[{}].url", section, index),
                    "URL ist erforderlich",
                ));
            }
            *index += 1;
        }
        errors
    }

    pub fn has_changed(&self) -> bool {
        self.original != self.current
    }

    pub fn may_discard(&self, confirm: &dyn Confirm) -> bool {
        !self.has_changed() || confirm.confirm(&Prompt::discard_changes())
    }

    /// Record to persist: blank optional text cleared, empty rows dropped.
    pub fn submit_payload(&self) -> Association {
        let mut a = self.current.clone();
        for field in [
            &mut a.short_name,
            &mut a.address_line1,
            &mut a.address_line2,
            &mut a.address_line3,
            &mut a.street,
            &mut a.postcode,
            &mut a.city,
            &mut a.country,
        ] {
            blank_to_none(field);
        }
        for text in [&mut a.goals, &mut a.activities] {
            if text.as_ref().is_some_and(|t: &TextBlock| t.text.trim().is_empty()) {
                *text = None;
            }
        }
        for contact in &mut a.contacts {
            for field in [
                &mut contact.name,
                &mut contact.phone,
                &mut contact.fax,
                &mut contact.mail,
            ] {
                blank_to_none(field);
            }
        }
        a.contacts.retain(|c| *c != Contact::default());
        a.links.retain(|l: &Link| !l.url.trim().is_empty());
        a.social_media.retain(|s: &SocialMediaLink| !s.url.trim().is_empty());
        a.images.retain(|i: &Image| !i.url.trim().is_empty());
        a
    }

    /// Marks the current state as saved.
    pub fn mark_saved(&mut self) {
        self.current = self.submit_payload();
        self.original = self.current.clone();
    }
}

fn known_values(values: Vec<String>, options: &[DropdownOption]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if options.iter().any(|o| o.value == value) && !kept.contains(&value) {
            kept.push(value);
        }
    }
    kept
}
