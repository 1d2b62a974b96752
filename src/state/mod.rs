use std::sync::Arc;

use crate::admin::AdminService;
use crate::chat::{ChatHistory, ChatService, SessionManager};
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::errors::ApiError;
use crate::core::security::{IdentityResolver, JwtIdentityResolver};
use crate::documents::DocumentService;
use crate::ingestion::{FileDocumentLoader, IngestionPipeline, RecursiveCharacterSplitter};
use crate::llm::{LanguageModel, OpenAiCompatibleModel};
use crate::relational::RelationalStore;
use crate::retrieval::AnswerComposer;
use crate::vector::{build_embedder, build_index, VectorIndex};

pub mod error;

use error::InitializationError;

/// Shared application state handed to every route and background task.
///
/// The relational pool, vector index and optional language model are built
/// once here and shared by the services that sit on top of them.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Settings,
    pub identity: Arc<dyn IdentityResolver>,
    pub relational: RelationalStore,
    pub index: Arc<dyn VectorIndex>,
    pub ingestion: IngestionPipeline,
    pub documents: DocumentService,
    pub chat: ChatService,
    pub history: ChatHistory,
    pub admin: AdminService,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Loads the merged configuration for the given paths
    /// 2. Opens the relational store and the vector index
    /// 3. Builds the language model client when an API key is configured
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let relational = RelationalStore::open(&paths.relational_db_path)
            .await
            .map_err(|e| InitializationError::Relational(e.into()))?;

        let embedder =
            build_embedder(&settings).map_err(|e| InitializationError::VectorIndex(e.into()))?;
        let index = build_index(&settings, &paths, embedder)
            .await
            .map_err(|e| InitializationError::VectorIndex(e.into()))?;

        let model = OpenAiCompatibleModel::from_settings(&settings.llm)
            .map_err(|e| InitializationError::Llm(e.into()))?
            .map(|model| Arc::new(model) as Arc<dyn LanguageModel>);
        match &model {
            Some(model) => tracing::info!("Answers composed with model '{}'", model.model_name()),
            None => tracing::warn!("No LLM API key configured; answers use the offline stub"),
        }

        Self::from_parts(paths, config, settings, relational, index, model)
            .map_err(|e| InitializationError::Identity(e.into()))
    }

    /// Wires the services over already-opened stores.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        relational: RelationalStore,
        index: Arc<dyn VectorIndex>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Arc<Self>, ApiError> {
        let identity: Arc<dyn IdentityResolver> = Arc::new(JwtIdentityResolver::new(
            &settings.auth.jwt_secret,
            &settings.auth.jwt_algorithm,
        )?);

        let splitter = RecursiveCharacterSplitter::new(
            settings.ingestion.chunk_size,
            settings.ingestion.chunk_overlap,
        );
        let ingestion = IngestionPipeline::new(
            relational.clone(),
            index.clone(),
            Arc::new(FileDocumentLoader::new(splitter)),
            settings.ingestion.clone(),
        );
        let documents = DocumentService::new(relational.clone(), index.clone());
        let composer = AnswerComposer::new(index.clone(), model, settings.retrieval.clone());
        let sessions =
            SessionManager::new(relational.clone(), settings.sessions.recency_window_hours);
        let chat = ChatService::new(composer, sessions);
        let history = ChatHistory::new(relational.clone());
        let admin = AdminService::new(relational.clone(), documents.clone());

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            identity,
            relational,
            index,
            ingestion,
            documents,
            chat,
            history,
            admin,
        }))
    }
}
