use crate::config::DataServiceConfig;
use crate::filter::sort_by_display_name;
use crate::types::{Association, DropdownOption, OptionType, ServiceResponse, Toast};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("request error: {0}")]
    Generic(#[from] anyhow::Error),
    #[error("network error: {status_code} {message}")]
    NetworkError { status_code: u16, message: String },
}

impl ClientError {
    /// Serialized form shown as toast detail.
    pub fn detail(&self) -> String {
        match self {
            Self::Generic(e) => serde_json::json!({ "message": e.to_string() }).to_string(),
            Self::NetworkError {
                status_code,
                message,
            } => serde_json::json!({ "status": status_code, "message": message }).to_string(),
        }
    }
}

#[async_trait]
trait ResponseExt {
    async fn map_client_error(self) -> Result<Response, ClientError>;
}

#[async_trait]
impl ResponseExt for Result<Response, reqwest::Error> {
    async fn map_client_error(self) -> Result<Response, ClientError> {
        match self {
            Ok(response) => match response.status() {
                StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                    Ok(response)
                }
                status => Err(ClientError::NetworkError {
                    status_code: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                }),
            },
            Err(e) => Err(ClientError::Generic(anyhow::anyhow!(e.to_string()))),
        }
    }
}

/// Remote store of associations and option lists.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn associations(&self) -> Result<ServiceResponse<Vec<Association>>, ClientError>;

    async fn options(&self, option_type: OptionType) -> Result<Vec<DropdownOption>, ClientError>;

    /// Replaces the whole option collection of one type.
    async fn replace_options(
        &self,
        option_type: OptionType,
        options: &[DropdownOption],
    ) -> Result<(), ClientError>;

    async fn save_association(&self, association: &Association) -> Result<(), ClientError>;

    async fn import(&self, associations: &[Association]) -> Result<(), ClientError>;

    async fn district_options(&self) -> Result<Vec<DropdownOption>, ClientError> {
        self.options(OptionType::Districts).await
    }

    async fn activity_options(&self) -> Result<Vec<DropdownOption>, ClientError> {
        self.options(OptionType::Activities).await
    }
}

#[derive(Clone)]
pub struct HttpDataService {
    config: DataServiceConfig,
    client: reqwest::Client,
}

impl HttpDataService {
    pub fn new(config: DataServiceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn options_path(&self, option_type: OptionType) -> &str {
        match option_type {
            OptionType::Activities => &self.config.paths.activity_options,
            OptionType::Districts => &self.config.paths.district_options,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ServiceResponse<T>, ClientError> {
        let url = self.url(path);
        let response = self.client.get(&url).send().await.map_client_error().await?;
        response.json::<ServiceResponse<T>>().await.map_err(|e| {
            ClientError::Generic(anyhow::anyhow!(
                "unable to parse response from {}: {}",
                url,
                e.to_string()
            ))
        })
    }

    async fn post<B: Serialize + ?Sized + Sync>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        let url = self.url(path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_client_error()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DataService for HttpDataService {
    #[tracing::instrument(skip(self))]
    async fn associations(&self) -> Result<ServiceResponse<Vec<Association>>, ClientError> {
        self.get(&self.config.paths.associations).await
    }

    #[tracing::instrument(skip(self))]
    async fn options(&self, option_type: OptionType) -> Result<Vec<DropdownOption>, ClientError> {
        let response: ServiceResponse<Vec<DropdownOption>> =
            self.get(self.options_path(option_type)).await?;
        Ok(response.data.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, options), fields(count = options.len()))]
    async fn replace_options(
        &self,
        option_type: OptionType,
        options: &[DropdownOption],
    ) -> Result<(), ClientError> {
        self.post(self.options_path(option_type), options).await
    }

    #[tracing::instrument(skip(self, association), fields(id = %association.id))]
    async fn save_association(&self, association: &Association) -> Result<(), ClientError> {
        self.post(&self.config.paths.associations, association).await
    }

    #[tracing::instrument(skip(self, associations), fields(count = associations.len()))]
    async fn import(&self, associations: &[Association]) -> Result<(), ClientError> {
        self.post(&self.config.paths.import, associations).await
    }
}

/// Everything the map view needs, fetched once at initialization.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub associations: Vec<Association>,
    pub district_options: Vec<DropdownOption>,
    pub activity_options: Vec<DropdownOption>,
    pub toast: Option<Toast>,
}

/// Loads associations, then districts, then activities. Failures degrade to empty lists;
/// an empty association list is reported as a toast rather than an error.
pub async fn load_directory(service: &dyn DataService) -> Directory {
    info!("Loading associations...");
    let (associations, error_message) = match service.associations().await {
        Ok(response) => (response.data.unwrap_or_default(), response.error_message),
        Err(e) => {
            warn!("Failed to load associations: {}", e);
            (Vec::new(), Some(e.detail()))
        }
    };
    let associations = sort_by_display_name(associations);

    let district_options = service.district_options().await.unwrap_or_else(|e| {
        warn!("Failed to load district options: {}", e);
        Vec::new()
    });
    let activity_options = service.activity_options().await.unwrap_or_else(|e| {
        warn!("Failed to load activity options: {}", e);
        Vec::new()
    });

    let toast = associations.is_empty().then(|| {
        Toast::error(
            "Fehler beim Abrufen der Vereine",
            error_message.unwrap_or_default(),
        )
    });

    info!(
        "Loaded {} associations, {} district options, {} activity options",
        associations.len(),
        district_options.len(),
        activity_options.len()
    );

    Directory {
        associations,
        district_options,
        activity_options,
        toast,
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryDataService;
    use super::*;

    fn association(id: &str, name: &str) -> Association {
        Association {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_directory_sorts_by_display_name() {
        let service = MemoryDataService::with(
            vec![association("1", "zeta"), association("2", "Alpha")],
            vec![DropdownOption::new("d1", "Mitte", None)],
            vec![],
        );

        let directory = load_directory(&service).await;

        let ids: Vec<_> = directory.associations.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(directory.district_options.len(), 1);
        assert!(directory.toast.is_none());
    }

    #[tokio::test]
    async fn empty_directory_reports_toast() {
        let service = MemoryDataService::default();
        let directory = load_directory(&service).await;
        let toast = directory.toast.expect("toast for empty directory");
        assert_eq!(toast.severity, crate::types::Severity::Error);
        assert_eq!(toast.summary, "Fehler beim Abrufen der Vereine");
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let service = HttpDataService::new(DataServiceConfig {
            base_url: "http://db/api/".into(),
            paths: Default::default(),
        });
        assert_eq!(service.url("/associations"), "http://db/api/associations");
        assert_eq!(
            service.url(service.options_path(OptionType::Districts)),
            "http://db/api/options/districts"
        );
    }

    #[test]
    fn network_error_detail_is_json() {
        let error = ClientError::NetworkError {
            status_code: 503,
            message: "down".into(),
        };
        let detail: serde_json::Value = serde_json::from_str(&error.detail()).unwrap();
        assert_eq!(detail["status"], 503);
        assert_eq!(detail["message"], "down");
    }
}
