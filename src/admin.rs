use crate::association_form::{AssociationForm, Section};
use crate::confirm::Outcome;
use crate::data::DataService;
use crate::error::{not_found, AppError};
use crate::filter::sort_by_display_name;
use crate::import::{ImportBatch, ImportFormat};
use crate::options_form::OptionsForm;
use crate::types::{Association, OptionType, Toast};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub struct FormAppState {
    pub service: Arc<dyn DataService>,
    pub root_path: String,
}

impl FormAppState {
    fn path(&self, suffix: &str) -> String {
        format!("{}{}", self.root_path.trim_end_matches('/'), suffix)
    }

    async fn find_association(&self, id: &str) -> Result<Association, AppError> {
        let response = self
            .service
            .associations()
            .await
            .map_err(AppError::service("Fehler beim Abrufen der Vereine"))?;
        response
            .data
            .unwrap_or_default()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("association {}", id)))
    }

    async fn options_form(&self, option_type: OptionType) -> Result<OptionsForm, AppError> {
        let options = self
            .service
            .options(option_type)
            .await
            .map_err(AppError::service("Optionen konnten nicht geladen werden."))?;
        Ok(OptionsForm::new(option_type, &options))
    }
}

pub fn form_router(state: Arc<FormAppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route(
            "/associations",
            get(list_associations_handler).post(new_association_handler),
        )
        .route(
            "/associations/:id",
            get(association_handler).put(save_association_handler),
        )
        .route("/associations/:id/edit", post(edit_association_handler))
        .route("/options", get(default_options_handler))
        .route(
            "/options/:option_type",
            get(options_handler).put(save_options_handler),
        )
        .route("/options/:option_type/edit", post(edit_options_handler))
        .route("/options/:option_type/reset", post(reset_options_handler))
        .route("/import", get(import_form_handler).post(import_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn root_handler(State(app): State<Arc<FormAppState>>) -> Redirect {
    Redirect::to(&app.path("/associations"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationList {
    associations: Vec<Association>,
    #[serde(skip_serializing_if = "Option::is_none")]
    toast: Option<Toast>,
}

async fn list_associations_handler(
    State(app): State<Arc<FormAppState>>,
) -> Result<Json<AssociationList>, AppError> {
    let response = app
        .service
        .associations()
        .await
        .map_err(AppError::service("Fehler beim Abrufen der Vereine"))?;
    let associations = sort_by_display_name(response.data.unwrap_or_default());
    let toast = associations.is_empty().then(|| {
        Toast::error(
            "Fehler beim Abrufen der Vereine",
            response.error_message.unwrap_or_default(),
        )
    });
    Ok(Json(AssociationList {
        associations,
        toast,
    }))
}

async fn new_association_handler() -> Json<AssociationForm> {
    Json(AssociationForm::blank())
}

async fn association_handler(
    State(app): State<Arc<FormAppState>>,
    Path(id): Path<String>,
) -> Result<Json<AssociationForm>, AppError> {
    let association = app.find_association(&id).await?;
    Ok(Json(AssociationForm::new(association)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAssociation {
    form: AssociationForm,
    toast: Toast,
}

async fn save_association_handler(
    State(app): State<Arc<FormAppState>>,
    Path(id): Path<String>,
    Json(mut form): Json<AssociationForm>,
) -> Result<Json<SavedAssociation>, AppError> {
    if form.current.id != id {
        return Err(AppError::BadRequest(format!(
            "id {} does not match {}",
            form.current.id, id
        )));
    }
    let errors = form.validate();
    if !errors.is_empty() {
        return Err(AppError::invalid("Verein ist unvollständig.", errors));
    }
    app.service
        .save_association(&form.submit_payload())
        .await
        .map_err(AppError::service("Verein konnte nicht gespeichert werden."))?;
    form.mark_saved();
    info!("Saved association {}", id);
    Ok(Json(SavedAssociation {
        form,
        toast: Toast::success("Verein wurde gespeichert."),
    }))
}

#[derive(Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum AssociationCommand {
    AddRow { section: Section, index: usize },
    RemoveRow { section: Section, index: usize },
    MoveRow { section: Section, from: usize, to: usize },
    SetDistricts { values: Vec<String> },
    SetActivities { values: Vec<String> },
}

#[derive(Deserialize)]
pub struct AssociationEdit {
    form: AssociationForm,
    #[serde(flatten)]
    command: AssociationCommand,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Serialize)]
pub struct EditResponse<F> {
    form: F,
    #[serde(flatten)]
    outcome: Outcome,
}

fn changed(applied: bool) -> Outcome {
    if applied {
        Outcome::Applied
    } else {
        Outcome::Unchanged
    }
}

async fn edit_association_handler(
    State(app): State<Arc<FormAppState>>,
    Json(edit): Json<AssociationEdit>,
) -> Result<Json<EditResponse<AssociationForm>>, AppError> {
    let mut form = edit.form;
    let outcome = match edit.command {
        AssociationCommand::AddRow { section, index } => {
            form.add_row(section, index);
            Outcome::Applied
        }
        AssociationCommand::RemoveRow { section, index } => {
            form.remove_row(section, index, &edit.confirmed)
        }
        AssociationCommand::MoveRow { section, from, to } => {
            changed(form.move_row(section, from, to))
        }
        AssociationCommand::SetDistricts { values } => {
            let options = app
                .service
                .district_options()
                .await
                .map_err(AppError::service("Optionen konnten nicht geladen werden."))?;
            form.set_districts(values, &options);
            Outcome::Applied
        }
        AssociationCommand::SetActivities { values } => {
            let options = app
                .service
                .activity_options()
                .await
                .map_err(AppError::service("Optionen konnten nicht geladen werden."))?;
            form.set_activities(values, &options);
            Outcome::Applied
        }
    };
    Ok(Json(EditResponse { form, outcome }))
}

fn parse_option_type(raw: &str) -> Result<OptionType, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

fn options_response(app: &FormAppState, form: OptionsForm) -> Response {
    let location = form.history_path(&app.root_path);
    ([(header::CONTENT_LOCATION, location)], Json(form)).into_response()
}

async fn default_options_handler(
    State(app): State<Arc<FormAppState>>,
) -> Result<Response, AppError> {
    let form = app.options_form(OptionType::default()).await?;
    Ok(options_response(&app, form))
}

async fn options_handler(
    State(app): State<Arc<FormAppState>>,
    Path(option_type): Path<String>,
) -> Result<Response, AppError> {
    let form = app.options_form(parse_option_type(&option_type)?).await?;
    Ok(options_response(&app, form))
}

#[derive(Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum OptionsCommand {
    Add {
        index: usize,
        #[serde(default)]
        category: Option<String>,
    },
    Remove {
        index: usize,
    },
    ChangeCategory {
        index: usize,
        #[serde(default)]
        category: Option<String>,
    },
}

#[derive(Deserialize)]
pub struct OptionsEdit {
    form: OptionsForm,
    #[serde(flatten)]
    command: OptionsCommand,
    #[serde(default)]
    confirmed: bool,
}

async fn edit_options_handler(
    Path(option_type): Path<String>,
    Json(edit): Json<OptionsEdit>,
) -> Result<Json<EditResponse<OptionsForm>>, AppError> {
    let option_type = parse_option_type(&option_type)?;
    let mut form = edit.form;
    if form.option_type != option_type {
        return Err(AppError::BadRequest(format!(
            "form edits {} but route names {}",
            form.option_type, option_type
        )));
    }
    let outcome = match edit.command {
        OptionsCommand::Add { index, category } => {
            form.add_option(index, category);
            Outcome::Applied
        }
        OptionsCommand::Remove { index } => form.remove(index, &edit.confirmed),
        OptionsCommand::ChangeCategory { index, category } => {
            form.change_category(index, category, &edit.confirmed)
        }
    };
    Ok(Json(EditResponse { form, outcome }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedOptions {
    form: OptionsForm,
    toast: Toast,
}

async fn save_options_handler(
    State(app): State<Arc<FormAppState>>,
    Path(option_type): Path<String>,
    Json(form): Json<OptionsForm>,
) -> Result<Response, AppError> {
    let option_type = parse_option_type(&option_type)?;
    let errors = form.validate();
    if !errors.is_empty() {
        return Err(AppError::invalid(
            "Optionen konnten nicht gespeichert werden.",
            errors,
        ));
    }
    let payload = form.submit_payload();
    app.service
        .replace_options(option_type, &payload)
        .await
        .map_err(AppError::service("Optionen konnten nicht gespeichert werden."))?;
    info!("Saved {} {} options", payload.len(), option_type);

    let form = app.options_form(option_type).await?;
    let location = form.history_path(&app.root_path);
    Ok((
        [(header::CONTENT_LOCATION, location)],
        Json(SavedOptions {
            form,
            toast: Toast::success("Optionen wurden gespeichert."),
        }),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct ResetRequest {
    form: OptionsForm,
    #[serde(default)]
    confirmed: bool,
}

async fn reset_options_handler(
    State(app): State<Arc<FormAppState>>,
    Path(option_type): Path<String>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<EditResponse<OptionsForm>>, AppError> {
    let option_type = parse_option_type(&option_type)?;
    if !request.form.may_discard(&request.confirmed) {
        return Ok(Json(EditResponse {
            form: request.form,
            outcome: Outcome::Declined {
                prompt: crate::confirm::Prompt::discard_changes(),
            },
        }));
    }
    let form = app.options_form(option_type).await?;
    Ok(Json(EditResponse {
        form,
        outcome: Outcome::Applied,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportParams {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    batch: ImportBatch,
    imported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    toast: Option<Toast>,
}

/// Content types accepted by `POST /import`.
const IMPORT_CONTENT_TYPES: [&str; 3] = ["text/csv", "application/json", "application/geo+json"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportForm {
    batch: ImportBatch,
    content_types: [&'static str; 3],
}

async fn import_form_handler() -> Json<ImportForm> {
    Json(ImportForm {
        batch: ImportBatch::default(),
        content_types: IMPORT_CONTENT_TYPES,
    })
}

async fn import_handler(
    State(app): State<Arc<FormAppState>>,
    Query(params): Query<ImportParams>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    let batch = ImportBatch::parse(ImportFormat::from_content_type(content_type), &body)
        .map_err(|e| AppError::BadRequest(format!("{:#}", e)))?;

    if !batch.is_valid() {
        return Err(AppError::invalid("Import enthält fehlerhafte Zeilen.", &batch.errors));
    }
    if params.dry_run {
        return Ok(Json(ImportResponse {
            batch,
            imported: 0,
            toast: None,
        })
        .into_response());
    }

    let imported = batch.submit(app.service.as_ref()).await?;
    Ok(Json(ImportResponse {
        batch,
        imported,
        toast: Some(Toast::success(&format!("{} Vereine wurden importiert.", imported))),
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryDataService;
    use crate::types::DropdownOption;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn service() -> Arc<MemoryDataService> {
        Arc::new(MemoryDataService::with(
            vec![
                Association {
                    id: "2".into(),
                    name: "Turnverein".into(),
                    lat: 48.78,
                    lng: 9.18,
                    ..Default::default()
                },
                Association {
                    id: "1".into(),
                    name: "Chor".into(),
                    lat: 48.77,
                    lng: 9.17,
                    ..Default::default()
                },
            ],
            vec![DropdownOption::new("mitte", "Mitte", None)],
            vec![
                DropdownOption::new("sport", "Sport", None),
                DropdownOption::new("football", "Fußball", Some("sport")),
            ],
        ))
    }

    fn app(service: Arc<MemoryDataService>) -> Router {
        form_router(Arc::new(FormAppState {
            service,
            root_path: "/admin".into(),
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_redirects_to_associations() {
        let response = app(service()).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/associations");
    }

    #[tokio::test]
    async fn associations_are_listed_by_name() {
        let response = app(service()).oneshot(get("/associations")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["associations"][0]["name"], "Chor");
        assert_eq!(json["associations"][1]["name"], "Turnverein");
        assert!(json.get("toast").is_none());
    }

    #[tokio::test]
    async fn unknown_association_is_not_found() {
        let response = app(service()).oneshot(get("/associations/9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saving_an_invalid_association_reports_fields() {
        let service = service();
        let form = AssociationForm::new(Association {
            id: "1".into(),
            name: String::new(),
            ..Default::default()
        });
        let response = app(service.clone())
            .oneshot(json_request(
                "PUT",
                "/associations/1",
                serde_json::to_value(&form).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["errors"][0]["field"], "name");
        assert_eq!(service.associations.lock().unwrap()[1].name, "Chor");
    }

    #[tokio::test]
    async fn saving_an_association_writes_through() {
        let service = service();
        let mut form = AssociationForm::new(Association {
            id: "1".into(),
            name: "Chor".into(),
            lat: 48.77,
            lng: 9.17,
            ..Default::default()
        });
        form.current.city = Some("Stuttgart".into());
        let response = app(service.clone())
            .oneshot(json_request(
                "PUT",
                "/associations/1",
                serde_json::to_value(&form).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["toast"]["severity"], "success");
        let stored = service.associations.lock().unwrap();
        assert_eq!(stored[1].city.as_deref(), Some("Stuttgart"));
    }

    #[tokio::test]
    async fn removing_a_row_needs_confirmation() {
        let form = AssociationForm::new(Association {
            id: "1".into(),
            name: "Chor".into(),
            contacts: vec![Default::default()],
            ..Default::default()
        });
        let request = |confirmed: bool| {
            json_request(
                "POST",
                "/associations/1/edit",
                serde_json::json!({
                    "form": form,
                    "command": "removeRow",
                    "section": "contacts",
                    "index": 0,
                    "confirmed": confirmed,
                }),
            )
        };
        let app = app(service());

        let json = body_json(app.clone().oneshot(request(false)).await.unwrap()).await;
        assert_eq!(json["outcome"], "declined");
        assert_eq!(json["form"]["current"]["contacts"].as_array().unwrap().len(), 1);

        let json = body_json(app.oneshot(request(true)).await.unwrap()).await;
        assert_eq!(json["outcome"], "applied");
        assert!(json["form"]["current"]["contacts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn options_default_to_activities_with_history_location() {
        let response = app(service()).oneshot(get("/options")).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_LOCATION],
            "/admin/options-form/activities"
        );
        let json = body_json(response).await;
        assert_eq!(json["optionType"], "activities");
        assert_eq!(json["rows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_option_type_is_rejected() {
        let response = app(service()).oneshot(get("/options/colours")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edited_options_are_saved_and_reloaded() {
        let service = service();
        let app = app(service.clone());
        let form = body_json(app.clone().oneshot(get("/options/districts")).await.unwrap()).await;

        let edited = body_json(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/options/districts/edit",
                    serde_json::json!({"form": form, "command": "add", "index": 1}),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(edited["outcome"], "applied");

        // new row has no label yet
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/options/districts", edited["form"].clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let mut form = edited["form"].clone();
        form["rows"][1]["label"] = "Süd".into();
        let response = app
            .oneshot(json_request("PUT", "/options/districts", form))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["toast"]["summary"], "Optionen wurden gespeichert.");
        assert_eq!(json["form"]["rows"][1]["label"], "Süd");
        assert_eq!(service.options.lock().unwrap()[&OptionType::Districts].len(), 2);
    }

    #[tokio::test]
    async fn failed_option_write_reports_error_toast() {
        let service = Arc::new(MemoryDataService {
            fail_writes: true,
            ..MemoryDataService::with(
                Vec::new(),
                vec![DropdownOption::new("mitte", "Mitte", None)],
                Vec::new(),
            )
        });
        let app = app(service);
        let form = body_json(app.clone().oneshot(get("/options/districts")).await.unwrap()).await;
        let response = app
            .oneshot(json_request("PUT", "/options/districts", form))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["toast"]["summary"], "Optionen konnten nicht gespeichert werden.");
    }

    #[tokio::test]
    async fn reset_keeps_changes_unless_confirmed() {
        let app = app(service());
        let mut form = body_json(app.clone().oneshot(get("/options/activities")).await.unwrap()).await;
        form["rows"][0]["label"] = "Sportarten".into();

        let json = body_json(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/options/activities/reset",
                    serde_json::json!({"form": form}),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["outcome"], "declined");
        assert_eq!(json["form"]["rows"][0]["label"], "Sportarten");

        let json = body_json(
            app.oneshot(json_request(
                "POST",
                "/options/activities/reset",
                serde_json::json!({"form": form, "confirmed": true}),
            ))
            .await
            .unwrap(),
        )
        .await;
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["form"]["rows"][0]["label"], "Sport");
    }

    #[tokio::test]
    async fn import_page_starts_empty() {
        let response = app(service()).oneshot(get("/import")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["batch"]["associations"].as_array().unwrap().is_empty());
        assert!(json["batch"]["errors"].as_array().unwrap().is_empty());
        assert_eq!(json["contentTypes"][0], "text/csv");
    }

    #[tokio::test]
    async fn csv_import_supports_dry_run() {
        let service = service();
        let app = app(service.clone());
        let csv = "name,lat,lng\nKegelclub,48.7,9.1\n";
        let request = |uri: &str| {
            Request::builder()
                .uri(uri)
                .method("POST")
                .header("content-type", "text/csv")
                .body(Body::from(csv))
                .unwrap()
        };

        let json = body_json(app.clone().oneshot(request("/import?dryRun=true")).await.unwrap()).await;
        assert_eq!(json["imported"], 0);
        assert_eq!(json["batch"]["associations"][0]["name"], "Kegelclub");
        assert!(service.imported.lock().unwrap().is_empty());

        let json = body_json(app.oneshot(request("/import")).await.unwrap()).await;
        assert_eq!(json["imported"], 1);
        assert_eq!(service.imported.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_with_invalid_rows_is_rejected() {
        let response = app(service())
            .oneshot(json_request(
                "POST",
                "/import",
                serde_json::json!([{"name": "", "lat": 1.0, "lng": 1.0}]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["errors"][0]["row"], 1);
    }
}
