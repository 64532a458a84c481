use crate::options::sub_options;
use crate::types::{Association, DropdownOption, SocialMediaPlatform};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Popup offset in pixels, keeps it above the 48px marker.
pub const POPUP_OFFSET: [f64; 2] = [0.0, -56.0];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PopupState {
    #[default]
    Closed,
    Open { id: String },
}

impl PopupState {
    pub fn open_id(&self) -> Option<&str> {
        match self {
            PopupState::Open { id } => Some(id),
            PopupState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PopupState::Open { .. })
    }

    /// Opens the popup for `id`, or closes it if it already shows `id`.
    /// Returns whether the popup is open afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.open_id() == Some(id) {
            *self = PopupState::Closed;
            false
        } else {
            *self = PopupState::Open { id: id.to_string() };
            true
        }
    }

    /// Returns whether a popup was open.
    pub fn close(&mut self) -> bool {
        std::mem::take(self).is_open()
    }
}

/// Overlay to place on the map for an open popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupOverlay {
    pub id: String,
    pub position: [f64; 2],
    pub positioning: &'static str,
    pub offset: [f64; 2],
    pub html: String,
}

/// `tel:` URI with German trunk prefixes rewritten to `+49`. Empty when there are no digits.
pub fn telephone_link(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return String::new();
    }

    let number = if input.trim_start().starts_with('+') {
        format!("+{}", digits)
    } else if let Some(rest) = digits.strip_prefix("0049") {
        format!("+49{}", rest)
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+49{}", rest)
    } else {
        digits
    };
    format!("tel:{}", number)
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Small platform icon, nothing for unknown platforms.
pub fn social_media_icon(platform: Option<&str>, alt: bool) -> String {
    let platform = match platform {
        Some(p) if !p.is_empty() && SocialMediaPlatform::parse(p) != SocialMediaPlatform::Other => p,
        // contact rows pass phone/fax/mail which have icons too
        Some(p @ ("phone" | "fax" | "mail")) => p,
        _ => return String::new(),
    };
    format!(
        r#"<div class="social-media-icon mini-icon"><img src="assets/{}.png" alt="{}"/></div>"#,
        escape_html(&platform.to_lowercase()),
        if alt { escape_html(platform) } else { String::new() }
    )
}

fn contact_row(out: &mut String, kind: &str, href: &str, text: &str) {
    let _ = write!(
        out,
        r#"<div class="association-contact"><div class="association-contact-row">{}<p class="{}"><a href="{}">{}</a></p></div></div>"#,
        social_media_icon(Some(kind), false),
        kind,
        escape_html(href),
        escape_html(text)
    );
}

/// Detail HTML for the popup of `association`.
pub fn popup_content(association: &Association, district_options: &[DropdownOption]) -> String {
    let a = association;
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="osm-association-inner-container"><div class="association-title"><h2>{}</h2></div>"#,
        escape_html(&a.name)
    );

    if !a.images.is_empty() {
        out.push_str(r#"<div class="association-images">"#);
        for img in &a.images {
            let _ = write!(
                out,
                r#"<div class="association-image"><img src="{}" alt="{}" /></div>"#,
                escape_html(&img.url),
                escape_html(img.alt_text.as_deref().unwrap_or_default())
            );
        }
        out.push_str("</div>");
    }

    out.push_str("<h2>Basisdaten</h2>");

    let address_fields = [
        &a.address_line1,
        &a.address_line2,
        &a.address_line3,
        &a.street,
        &a.postcode,
        &a.city,
        &a.country,
    ];
    if address_fields.iter().any(|f| non_empty(f).is_some()) {
        out.push_str(r#"<div class="association-address"><h3>Adresse</h3>"#);
        if let Some(line) = non_empty(&a.address_line1) {
            let _ = write!(out, r#"<p class="name"><strong>{}</strong></p>"#, escape_html(line));
        }
        for line in [&a.address_line2, &a.address_line3].into_iter().filter_map(non_empty) {
            let _ = write!(out, r#"<p class="name">{}</p>"#, escape_html(line));
        }
        if let Some(street) = non_empty(&a.street) {
            let _ = write!(out, r#"<p class="street">{}</p>"#, escape_html(street));
        }
        if non_empty(&a.postcode).is_some() || non_empty(&a.city).is_some() {
            let postcode_city = [non_empty(&a.postcode), non_empty(&a.city)]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let _ = write!(out, r#"<p class="postcode-city">{}</p>"#, escape_html(&postcode_city));
        }
        if let Some(country) = non_empty(&a.country) {
            let _ = write!(out, r#"<p class="country">{}</p>"#, escape_html(country));
        }
        out.push_str("</div>");
    }

    if !a.contacts.is_empty() {
        out.push_str(r#"<div class="association-contacts"><h3>Kontaktinformationen</h3>"#);
        for contact in &a.contacts {
            out.push_str(r#"<div class="association-contact">"#);
            if let Some(name) = non_empty(&contact.name) {
                let _ = write!(out, r#"<p class="name">{}</p>"#, escape_html(name));
            }
            if let Some(phone) = non_empty(&contact.phone) {
                contact_row(&mut out, "phone", &telephone_link(phone), phone);
            }
            if let Some(fax) = non_empty(&contact.fax) {
                contact_row(&mut out, "fax", &telephone_link(fax), fax);
            }
            if let Some(mail) = non_empty(&contact.mail) {
                contact_row(&mut out, "mail", &format!("mailto:{}", mail), mail);
            }
            out.push_str("</div>");
        }
        out.push_str("</div>");
    }

    let goals = a.goals.as_ref().map(|g| g.text.as_str()).filter(|t| !t.is_empty());
    let activities = a.activities.as_ref().map(|t| t.text.as_str()).filter(|t| !t.is_empty());
    if goals.is_some() || activities.is_some() {
        out.push_str("<h2>Beschreibung</h2>");
    }
    for (title, text) in [("Ziele des Vereins", goals), ("Aktivitäten", activities)] {
        if let Some(text) = text {
            let _ = write!(
                out,
                r#"<div class="association-description"><h3>{}</h3><p>{}</p></div>"#,
                title,
                escape_html(text)
            );
        }
    }

    if !a.links.is_empty() {
        out.push_str(r#"<div class="association-links"><h3>Links</h3><ul>"#);
        for link in &a.links {
            let text = escape_html(non_empty(&link.link_text).unwrap_or(&link.url));
            let _ = write!(
                out,
                r#"<li><a href="{}" title="{}" target="_blank">{}</a></li>"#,
                escape_html(&link.url),
                text,
                text
            );
        }
        out.push_str("</ul></div>");
    }

    if !a.social_media.is_empty() {
        out.push_str(r#"<div class="association-social-media"><h3>Social Media</h3>"#);
        for social in &a.social_media {
            let text = escape_html(
                non_empty(&social.link_text)
                    .or(non_empty(&social.platform))
                    .unwrap_or(&social.url),
            );
            let _ = write!(
                out,
                r#"<div class="social-media-link">{}<a href="{}" title="{}" target="_blank">{}</a></div>"#,
                social_media_icon(social.platform.as_deref(), true),
                escape_html(&social.url),
                text,
                text
            );
        }
        out.push_str("</div>");
    }

    if !a.district_list.is_empty() {
        out.push_str(
            r#"<div class="association-active-in"><h3>Aktivitätsgebiete</h3><div class="association-chips-container">"#,
        );
        for district in sub_options(district_options, &a.district_list) {
            let _ = write!(
                out,
                r#"<div class="association-chips">{}</div>"#,
                escape_html(&district.label)
            );
        }
        out.push_str("</div></div>");
    }

    out.push_str("</div>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Contact, Link, SocialMediaLink, TextBlock};

    #[test]
    fn telephone_links_use_german_country_code() {
        assert_eq!(telephone_link("0 151 1234567"), "tel:+491511234567");
        assert_eq!(telephone_link("+49 151 1234567"), "tel:+491511234567");
        assert_eq!(telephone_link("0049 (711) 12-34"), "tel:+497111234");
        assert_eq!(telephone_link("711 1234"), "tel:7111234");
        assert_eq!(telephone_link("keine Nummer"), "");
    }

    #[test]
    fn toggle_opens_switches_and_closes() {
        let mut popup = PopupState::default();
        assert!(popup.toggle("1"));
        assert_eq!(popup.open_id(), Some("1"));
        assert!(popup.toggle("2"));
        assert_eq!(popup.open_id(), Some("2"));
        assert!(!popup.toggle("2"));
        assert_eq!(popup, PopupState::Closed);
    }

    #[test]
    fn close_reports_whether_something_was_open() {
        let mut popup = PopupState::Open { id: "1".into() };
        assert!(popup.close());
        assert!(!popup.close());
    }

    #[test]
    fn popup_state_serializes_tagged() {
        let json = serde_json::to_value(PopupState::Open { id: "4".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "open", "id": "4"}));
        let closed: PopupState = serde_json::from_str(r#"{"state":"closed"}"#).unwrap();
        assert_eq!(closed, PopupState::Closed);
    }

    #[test]
    fn content_lists_contacts_links_and_district_chips() {
        let association = Association {
            id: "1".into(),
            name: "Garten & Co".into(),
            postcode: Some("70180".into()),
            city: Some("Stuttgart".into()),
            goals: Some(TextBlock {
                text: "Gärtnern".into(),
            }),
            contacts: vec![Contact {
                name: Some("Erika".into()),
                phone: Some("0711 123".into()),
                mail: Some("erika@example.org".into()),
                ..Default::default()
            }],
            links: vec![Link {
                url: "https://garten.example".into(),
                link_text: None,
            }],
            social_media: vec![SocialMediaLink {
                platform: Some("Facebook".into()),
                url: "https://fb.example/garten".into(),
                link_text: None,
            }],
            district_list: vec!["south".into(), "heslach".into()],
            ..Default::default()
        };
        let districts = vec![
            DropdownOption::new("south", "Süd", None),
            DropdownOption::new("heslach", "Heslach", Some("south")),
        ];

        let html = popup_content(&association, &districts);

        assert!(html.contains("<h2>Garten &amp; Co</h2>"));
        assert!(html.contains(r#"<p class="postcode-city">70180 Stuttgart</p>"#));
        assert!(html.contains(r#"href="tel:+49711123""#));
        assert!(html.contains(r#"href="mailto:erika@example.org""#));
        assert!(html.contains("<h2>Beschreibung</h2>"));
        assert!(html.contains(">https://garten.example</a>"));
        assert!(html.contains(r#"src="assets/facebook.png" alt="Facebook""#));
        assert!(html.contains(r#"<div class="association-chips">Heslach</div>"#));
        assert!(!html.contains(r#"<div class="association-chips">Süd</div>"#));
    }

    #[test]
    fn content_skips_empty_sections() {
        let association = Association {
            id: "1".into(),
            name: "Leer".into(),
            ..Default::default()
        };
        let html = popup_content(&association, &[]);
        assert!(!html.contains("Adresse"));
        assert!(!html.contains("Beschreibung"));
        assert!(html.contains("Basisdaten"));
    }

    #[test]
    fn other_platform_has_no_icon() {
        assert_eq!(social_media_icon(Some("Other"), true), "");
        assert_eq!(social_media_icon(None, true), "");
        assert!(social_media_icon(Some("mail"), false).contains(r#"alt="""#));
    }
}
