use crate::types::Association;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Transient search criteria of the map view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub selected_districts: Vec<String>,
    #[serde(default)]
    pub selected_activities: Vec<String>,
}

impl FilterState {
    pub fn apply<'a>(&self, associations: &'a [Association]) -> Vec<&'a Association> {
        filter(
            associations,
            &self.query,
            &self.selected_districts,
            &self.selected_activities,
        )
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.selected_districts.clear();
        self.selected_activities.clear();
    }

    pub fn reset_districts(&mut self) {
        self.selected_districts.clear();
    }

    pub fn reset_activities(&mut self) {
        self.selected_activities.clear();
    }
}

fn contains(field: Option<&str>, query: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(query))
}

fn matches_query(a: &Association, q: &str) -> bool {
    contains(Some(&a.name), q)
        || contains(a.short_name.as_deref(), q)
        || contains(a.street.as_deref(), q)
        || contains(a.postcode.as_deref(), q)
        || contains(a.city.as_deref(), q)
        || contains(a.country.as_deref(), q)
        || contains(a.goals.as_ref().map(|g| g.text.as_str()), q)
        || contains(a.activities.as_ref().map(|t| t.text.as_str()), q)
        || a.contacts.iter().any(|c| {
            contains(c.name.as_deref(), q)
                || contains(c.phone.as_deref(), q)
                || contains(c.fax.as_deref(), q)
                || contains(c.mail.as_deref(), q)
        })
        || a.links
            .iter()
            .any(|l| contains(Some(&l.url), q) || contains(l.link_text.as_deref(), q))
        || a.social_media.iter().any(|s| {
            contains(Some(&s.url), q)
                || contains(s.link_text.as_deref(), q)
                || contains(s.platform.as_deref(), q)
        })
        || a.images
            .iter()
            .any(|i| contains(Some(&i.url), q) || contains(i.alt_text.as_deref(), q))
}

fn overlaps(values: &[String], selected: &HashSet<&str>) -> bool {
    selected.is_empty() || values.iter().any(|v| selected.contains(v.as_str()))
}

/// Associations matching the free-text query and at least one selected district and activity.
/// Empty criteria always match; input order is kept.
pub fn filter<'a>(
    associations: &'a [Association],
    query: &str,
    selected_districts: &[String],
    selected_activities: &[String],
) -> Vec<&'a Association> {
    let q = query.to_lowercase();
    let districts: HashSet<&str> = selected_districts.iter().map(String::as_str).collect();
    let activities: HashSet<&str> = selected_activities.iter().map(String::as_str).collect();

    associations
        .iter()
        .filter(|a| q.is_empty() || matches_query(a, &q))
        .filter(|a| overlaps(&a.district_list, &districts))
        .filter(|a| overlaps(&a.activity_list, &activities))
        .collect()
}

/// Case-insensitive order on `shortName || name`, the order markers and list entries are created in.
pub fn sort_by_display_name(mut associations: Vec<Association>) -> Vec<Association> {
    associations.sort_by_cached_key(|a| a.display_name().to_lowercase());
    associations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Contact, Image, Link, SocialMediaLink, TextBlock};

    fn association(id: &str, name: &str) -> Association {
        Association {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    fn ids(result: &[&Association]) -> Vec<String> {
        result.iter().map(|a| a.id.clone()).collect()
    }

    fn sample() -> Vec<Association> {
        let mut a = association("1", "Chor Heslach");
        a.district_list = vec!["d1".into()];
        a.activity_list = vec!["music".into()];
        a.contacts = vec![Contact {
            mail: Some("info@chor.example".into()),
            ..Default::default()
        }];

        let mut b = association("2", "Fußballverein");
        b.district_list = vec!["d2".into()];
        b.activity_list = vec!["sport".into()];
        b.social_media = vec![SocialMediaLink {
            platform: Some("Instagram".into()),
            url: "https://instagram.com/fv".into(),
            link_text: None,
        }];

        let mut c = association("3", "Nachbarschaftshilfe");
        c.district_list = vec!["d1".into(), "d2".into()];
        c.goals = Some(TextBlock {
            text: "Hilfe im Alltag".into(),
        });
        c.links = vec![Link {
            url: "https://nachbarn.example".into(),
            link_text: Some("Homepage".into()),
        }];
        c.images = vec![Image {
            url: "https://img.example/logo.png".into(),
            alt_text: Some("Logo".into()),
        }];
        vec![a, b, c]
    }

    #[test]
    fn empty_criteria_return_everything_in_order() {
        let all = sample();
        assert_eq!(ids(&filter(&all, "", &[], &[])), vec!["1", "2", "3"]);
    }

    #[test]
    fn query_is_case_insensitive_across_nested_fields() {
        let all = sample();
        assert_eq!(ids(&filter(&all, "CHOR", &[], &[])), vec!["1"]);
        assert_eq!(ids(&filter(&all, "instagram", &[], &[])), vec!["2"]);
        assert_eq!(ids(&filter(&all, "alltag", &[], &[])), vec!["3"]);
        assert_eq!(ids(&filter(&all, "homepage", &[], &[])), vec!["3"]);
        assert_eq!(ids(&filter(&all, "logo", &[], &[])), vec!["3"]);
        assert!(filter(&all, "nirgendwo", &[], &[]).is_empty());
    }

    #[test]
    fn selecting_a_district_keeps_only_members() {
        let all = vec![
            Association {
                district_list: vec!["d1".into()],
                ..association("1", "A")
            },
            Association {
                district_list: vec!["d2".into()],
                ..association("2", "B")
            },
        ];
        assert_eq!(ids(&filter(&all, "", &["d1".into()], &[])), vec!["1"]);
    }

    #[test]
    fn predicates_are_anded() {
        let all = sample();
        let result = filter(&all, "", &["d1".into()], &["music".into()]);
        assert_eq!(ids(&result), vec!["1"]);
        let result = filter(&all, "hilfe", &["d2".into()], &["music".into()]);
        assert!(result.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let all = sample();
        let state = FilterState {
            query: "e".into(),
            selected_districts: vec!["d1".into()],
            selected_activities: vec![],
        };
        let once: Vec<Association> = state.apply(&all).into_iter().cloned().collect();
        let twice = state.apply(&once);
        assert_eq!(ids(&twice), once.iter().map(|a| a.id.clone()).collect::<Vec<_>>());
    }

    #[test]
    fn clear_resets_all_criteria() {
        let mut state = FilterState {
            query: "x".into(),
            selected_districts: vec!["d1".into()],
            selected_activities: vec!["a".into()],
        };
        state.reset_districts();
        assert!(state.selected_districts.is_empty());
        assert_eq!(state.selected_activities.len(), 1);
        state.clear();
        assert_eq!(state, FilterState::default());
    }

    #[test]
    fn sorts_by_short_name_then_name() {
        let mut b = association("b", "Zebra e.V.");
        b.short_name = Some("alpha".into());
        let sorted = sort_by_display_name(vec![association("a", "Beta"), b]);
        assert_eq!(sorted[0].id, "b");
    }
}
