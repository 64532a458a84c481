use crate::association_form::AssociationForm;
use crate::data::{ClientError, DataService};
use crate::types::{Association, Contact, Link, TextBlock};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geojson::{GeoJson, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Separator for list-valued CSV cells.
const LIST_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Json,
    GeoJson,
}

impl ImportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s: &str| s.to_lowercase())
            .ok_or_else(|| anyhow!("Import file has no extension"))?;
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "geojson" => Ok(Self::GeoJson),
            _ => Err(anyhow!("Unsupported import format: {}", extension)),
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        match essence {
            "text/csv" => Self::Csv,
            "application/geo+json" => Self::GeoJson,
            _ => Self::Json,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("import contains {0} invalid rows")]
    Invalid(usize),
    #[error("import contains no associations")]
    Empty,
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    // 1-based, header excluded
    pub row: usize,
    pub message: String,
}

/// Parsed import with its row problems; only submitted when there are none.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportBatch {
    pub associations: Vec<Association>,
    pub errors: Vec<RowError>,
}

impl ImportBatch {
    pub fn parse(format: ImportFormat, content: &str) -> Result<Self> {
        let parsed = match format {
            ImportFormat::Csv => parse_csv(content)?,
            ImportFormat::Json => parse_json(content)?,
            ImportFormat::GeoJson => parse_geojson(content)?,
        };
        Ok(Self::from_rows(parsed))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let format = ImportFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import file: {:?}", path))?;
        Self::parse(format, &content)
    }

    fn from_rows(rows: Vec<Result<Association, String>>) -> Self {
        let mut batch = ImportBatch::default();
        for (i, row) in rows.into_iter().enumerate() {
            let row_number = i + 1;
            match row {
                Ok(mut association) => {
                    if association.id.trim().is_empty() {
                        association.id = Uuid::new_v4().to_string();
                    }
                    let problems = AssociationForm::new(association.clone()).validate();
                    if problems.is_empty() {
                        batch.associations.push(association);
                    } else {
                        for problem in problems {
                            batch.errors.push(RowError {
                                row: row_number,
                                message: format!("{}: {}", problem.field, problem.message),
                            });
                        }
                    }
                }
                Err(message) => batch.errors.push(RowError {
                    row: row_number,
                    message,
                }),
            }
        }
        batch
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Bulk write of every parsed association.
    pub async fn submit(&self, service: &dyn DataService) -> Result<usize, ImportError> {
        if !self.is_valid() {
            return Err(ImportError::Invalid(self.errors.len()));
        }
        if self.associations.is_empty() {
            return Err(ImportError::Empty);
        }
        service.import(&self.associations).await?;
        info!("Imported {} associations", self.associations.len());
        Ok(self.associations.len())
    }
}

fn parse_json(content: &str) -> Result<Vec<Result<Association, String>>> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(content).context("Import JSON must be an array of associations")?;
    Ok(rows
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| e.to_string()))
        .collect())
}

fn parse_geojson(content: &str) -> Result<Vec<Result<Association, String>>> {
    let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    Ok(collection
        .features
        .into_iter()
        .map(|feature| {
            let (lng, lat) = match feature.geometry.map(|g| g.value) {
                Some(Value::Point(p)) if p.len() >= 2 => (p[0], p[1]),
                _ => return Err("feature geometry must be a point".to_string()),
            };
            let mut properties = feature.properties.unwrap_or_default();
            properties.insert("lat".into(), serde_json::json!(lat));
            properties.insert("lng".into(), serde_json::json!(lng));
            properties
                .entry("id")
                .or_insert_with(|| serde_json::json!(""));
            serde_json::from_value(serde_json::Value::Object(properties)).map_err(|e| e.to_string())
        })
        .collect())
}

fn parse_csv(content: &str) -> Result<Vec<Result<Association, String>>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(content.as_bytes());
    let headers = rdr.headers()?.clone();

    // Map column names to indices for faster lookup
    let col_indices: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();
    for required in ["name", "lat", "lng"] {
        if !col_indices.contains_key(required) {
            return Err(anyhow!("Column '{}' not found in CSV", required));
        }
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                rows.push(Err(e.to_string()));
                continue;
            }
        };
        let cell = |name: &str| -> Option<String> {
            col_indices
                .get(name)
                .and_then(|&idx| record.get(idx))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let list = |name: &str| -> Vec<String> {
            cell(name)
                .map(|v| {
                    v.split(LIST_SEPARATOR)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        let coordinate = |name: &str| -> Result<f64, String> {
            cell(name)
                .ok_or_else(|| format!("{} is missing", name))?
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|e| format!("{}: {}", name, e))
        };

        let row = (|| -> Result<Association, String> {
            let contact = Contact {
                name: cell("contactName"),
                phone: cell("contactPhone"),
                fax: cell("contactFax"),
                mail: cell("contactMail"),
            };
            Ok(Association {
                id: cell("id").unwrap_or_default(),
                name: cell("name").unwrap_or_default(),
                short_name: cell("shortName"),
                address_line1: cell("addressLine1"),
                address_line2: cell("addressLine2"),
                address_line3: cell("addressLine3"),
                street: cell("street"),
                postcode: cell("postcode"),
                city: cell("city"),
                country: cell("country"),
                lat: coordinate("lat")?,
                lng: coordinate("lng")?,
                goals: cell("goals").map(|text| TextBlock { text }),
                activities: cell("activities").map(|text| TextBlock { text }),
                contacts: if contact == Contact::default() {
                    Vec::new()
                } else {
                    vec![contact]
                },
                links: list("links")
                    .into_iter()
                    .map(|url| Link {
                        url,
                        link_text: None,
                    })
                    .collect(),
                social_media: Vec::new(),
                images: Vec::new(),
                district_list: list("districtList"),
                activity_list: list("activityList"),
            })
        })();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryDataService;

    const CSV: &str = "\
id,name,lat,lng,city,contactPhone,links,districtList
,Chor Heslach,48.75,9.15,Stuttgart,0711 123,https://chor.example; https://chor2.example,d1;d2
a-2,Sportverein,\"48,80\",9.20,,,,
a-3,Kaputt,north,9.20,,,,
";

    #[test]
    fn csv_rows_become_associations() {
        let batch = ImportBatch::parse(ImportFormat::Csv, CSV).unwrap();
        assert_eq!(batch.associations.len(), 2);
        let first = &batch.associations[0];
        assert!(Uuid::parse_str(&first.id).is_ok());
        assert_eq!(first.city.as_deref(), Some("Stuttgart"));
        assert_eq!(first.contacts[0].phone.as_deref(), Some("0711 123"));
        assert_eq!(first.links.len(), 2);
        assert_eq!(first.district_list, vec!["d1", "d2"]);
        let second = &batch.associations[1];
        assert_eq!(second.lat, 48.80);
        assert!(second.contacts.is_empty());
    }

    #[test]
    fn bad_rows_are_reported_by_number() {
        let batch = ImportBatch::parse(ImportFormat::Csv, CSV).unwrap();
        assert!(!batch.is_valid());
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].row, 3);
        assert!(batch.errors[0].message.starts_with("lat"));
    }

    #[test]
    fn csv_without_coordinates_is_rejected() {
        assert!(ImportBatch::parse(ImportFormat::Csv, "name,city\nA,B\n").is_err());
    }

    #[test]
    fn json_rows_validate_individually() {
        let json = r#"[
            {"id": "1", "name": "A", "lat": 48.7, "lng": 9.1},
            {"id": "2", "name": "", "lat": 48.7, "lng": 9.1},
            {"id": "3"}
        ]"#;
        let batch = ImportBatch::parse(ImportFormat::Json, json).unwrap();
        assert_eq!(batch.associations.len(), 1);
        let rows: Vec<_> = batch.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3]);
    }

    #[test]
    fn geojson_points_carry_coordinates() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [9.18, 48.78]},
                "properties": {"name": "Punktverein", "districtList": ["d1"]}
            }]
        }"#;
        let batch = ImportBatch::parse(ImportFormat::GeoJson, geojson).unwrap();
        assert!(batch.is_valid());
        let a = &batch.associations[0];
        assert_eq!((a.lng, a.lat), (9.18, 48.78));
        assert!(!a.id.is_empty());
    }

    #[test]
    fn formats_follow_extension_and_content_type() {
        assert_eq!(ImportFormat::from_path(Path::new("x.CSV")).unwrap(), ImportFormat::Csv);
        assert!(ImportFormat::from_path(Path::new("x.xlsx")).is_err());
        assert_eq!(
            ImportFormat::from_content_type("text/csv; charset=utf-8"),
            ImportFormat::Csv
        );
        assert_eq!(ImportFormat::from_content_type("application/json"), ImportFormat::Json);
    }

    #[tokio::test]
    async fn submit_writes_only_valid_batches() {
        let service = MemoryDataService::default();
        let invalid = ImportBatch::parse(ImportFormat::Csv, CSV).unwrap();
        assert!(matches!(invalid.submit(&service).await, Err(ImportError::Invalid(1))));
        assert!(service.imported.lock().unwrap().is_empty());

        let valid = ImportBatch::parse(
            ImportFormat::Json,
            r#"[{"id": "1", "name": "A", "lat": 48.7, "lng": 9.1}]"#,
        )
        .unwrap();
        assert_eq!(valid.submit(&service).await.unwrap(), 1);
        assert_eq!(service.imported.lock().unwrap().len(), 1);

        let empty = ImportBatch::default();
        assert!(matches!(empty.submit(&service).await, Err(ImportError::Empty)));
    }
}
