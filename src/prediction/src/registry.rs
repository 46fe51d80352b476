//! Custom model classes.
//!
//! User supplied models are registered under a fully qualified name. A model version
//! picks one through its configuration; without one the [`DefaultModel`] serves.
use crate::{
    client::PredictionClient,
    config::CreateVersionRequest,
    error::{PredictionError, Result},
    model::{DefaultModel, Model},
};
use std::{collections::HashMap, path::Path, sync::Arc};

/// Parameters of the model predict contract: the model itself, instances and stats.
pub const PREDICT_ARITY: usize = 3;

/// A user supplied model implementation.
///
/// Rust implementations satisfy the [`Model`] contract by construction and keep the
/// defaults of the shape accessors. Classes bridged from elsewhere report the shape
/// they declare so it can be checked before they are instantiated.
pub trait ModelClass: Send + Sync {
    /// Build the model for a client and the model data at `model_path`.
    fn from_client(
        &self,
        client: Arc<dyn PredictionClient>,
        model_path: &Path,
    ) -> Result<Box<dyn Model>>;

    /// Number of parameters taken by the class's predict entry point.
    fn predict_arity(&self) -> usize {
        PREDICT_ARITY
    }

    /// Whether the class exposes the model signature.
    fn has_signature(&self) -> bool {
        true
    }
}

type ModelFactory =
    dyn Fn(Arc<dyn PredictionClient>, &Path) -> Result<Box<dyn Model>> + Send + Sync;

struct FactoryClass(Box<ModelFactory>);

impl ModelClass for FactoryClass {
    fn from_client(
        &self,
        client: Arc<dyn PredictionClient>,
        model_path: &Path,
    ) -> Result<Box<dyn Model>> {
        (self.0)(client, model_path)
    }
}

/// Model classes by fully qualified name.
#[derive(Default)]
pub struct ModelRegistry {
    classes: HashMap<String, Box<dyn ModelClass>>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Register a model class under `name`.
    pub fn register<C>(&mut self, name: impl Into<String>, class: C) -> Result<()>
    where
        C: ModelClass + 'static,
    {
        let name = name.into();
        if self.classes.contains_key(&name) {
            return Err(PredictionError::invalid_user_code(format!(
                "Model class {} is already registered.",
                name
            )));
        }
        self.classes.insert(name, Box::new(class));
        Ok(())
    }

    /// Register a factory function as a model class under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: 'static
            + Fn(Arc<dyn PredictionClient>, &Path) -> Result<Box<dyn Model>>
            + Send
            + Sync,
    {
        self.register(name, FactoryClass(Box::new(factory)))
    }

    /// The class registered under `name`.
    pub fn get(&self, name: &str) -> Option<&dyn ModelClass> {
        self.classes.get(name).map(|class| class.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Load the custom model class named by `request`.
///
/// Returns `Ok(None)` when no class is configured, so the caller falls back to the
/// default model.
pub fn load_model_class(
    registry: &ModelRegistry,
    request: Option<&CreateVersionRequest>,
    client: &Arc<dyn PredictionClient>,
    model_path: &Path,
) -> Result<Option<Box<dyn Model>>> {
    let request = match request {
        Some(request) => request,
        None => return Ok(None),
    };
    let class_name = match request.model_class() {
        Some(name) => name,
        None => return Ok(None),
    };
    let class = registry.get(class_name).ok_or_else(|| {
        PredictionError::invalid_user_code(format!(
            "{} cannot be found. Please make sure (1) model_class is the fully qualified name \
             of a registered model class, and (2) model_class uses the correct package name \
             as provided by the package_uris: {:?}. Registered model classes: {:?}",
            class_name,
            request.package_uris(),
            registry.names()
        ))
    })?;
    validate_model_class(class_name, class)?;
    log::info!("Using custom model class {}", class_name);
    class.from_client(Arc::clone(client), model_path).map(Some)
}

fn validate_model_class(class_name: &str, class: &dyn ModelClass) -> Result<()> {
    if !class.has_signature() {
        return Err(PredictionError::invalid_user_code(format!(
            "The provided model class, {}, is missing the required signature property.",
            class_name
        )));
    }
    let user_arity = class.predict_arity();
    if user_arity != PREDICT_ARITY {
        return Err(PredictionError::invalid_user_code(format!(
            "The provided model class, {}, has a predict method with an invalid signature. \
             Expected {} parameters (self, instances, stats), got {}.",
            class_name, PREDICT_ARITY, user_arity
        )));
    }
    Ok(())
}

/// Create the model to serve: the configured custom class, or the default model.
pub fn create_model(
    registry: &ModelRegistry,
    request: Option<&CreateVersionRequest>,
    client: Arc<dyn PredictionClient>,
    model_path: &Path,
) -> Result<Box<dyn Model>> {
    match load_model_class(registry, request, &client, model_path)? {
        Some(model) => Ok(model),
        None => Ok(Box::new(DefaultModel::from_client(
            Box::new(client),
            model_path,
        ))),
    }
}
