//! Raw issue to canonical record transformation.
//!
//! `RecordTransformer` is the adapter the batch processor calls per item. It resolves the
//! template through the `TemplateRepository` and hands rendering to a `TransformationEngine`.
//! `FieldMappingEngine` is the engine shipped with the binary: each canonical field is a JSON
//! pointer into the raw issue.

use crate::sync::repositories::TemplateRepository;
use crate::sync::types::TransformError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Mapping from raw issue documents to canonical records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
	pub id: String,
	pub name: String,
	/// Canonical field name to JSON pointer into the raw issue.
	pub fields: BTreeMap<String, String>,
	/// Fields that must resolve to a non-null value.
	#[serde(default)]
	pub required: Vec<String>,
}

/// Renders a raw item with a template.
pub trait TransformationEngine: Send + Sync {
	fn render(&self, raw: &Value, template: &Template) -> Result<Value, TransformError>;
}

/// Engine that resolves each template field as a JSON pointer
#[derive(Debug, Clone, Default)]
pub struct FieldMappingEngine;

impl TransformationEngine for FieldMappingEngine {
	fn render(&self, raw: &Value, template: &Template) -> Result<Value, TransformError> {
		if template.fields.is_empty() {
			return Err(TransformError::InvalidOutput(format!(
				"template '{}' maps no fields",
				template.id
			)));
		}

		let mut record = Map::new();
		for (field, pointer) in &template.fields {
			if !pointer.is_empty() && !pointer.starts_with('/') {
				return Err(TransformError::Render(format!(
					"field '{}' has malformed pointer {:?}",
					field, pointer
				)));
			}

			let value = raw.pointer(pointer).cloned().unwrap_or(Value::Null);
			if value.is_null() && template.required.iter().any(|r| r == field) {
				return Err(TransformError::MissingField {
					field: field.clone(),
					pointer: pointer.clone(),
				});
			}
			record.insert(field.clone(), value);
		}

		Ok(Value::Object(record))
	}
}

/// Adapter between the batch processor and the template collaborators
pub struct RecordTransformer {
	templates: Arc<dyn TemplateRepository>,
	engine: Arc<dyn TransformationEngine>,
	/// Templates resolved during the current run.
	cache: Mutex<HashMap<String, Template>>,
}

impl RecordTransformer {
	pub fn new(templates: Arc<dyn TemplateRepository>, engine: Arc<dyn TransformationEngine>) -> Self {
		Self {
			templates,
			engine,
			cache: Mutex::new(HashMap::new()),
		}
	}

	/// Forget resolved templates so edits take effect.
	pub fn clear_cache(&self) {
		if let Ok(mut cache) = self.cache.lock() {
			cache.clear();
		}
	}

	async fn resolve(&self, template_id: &str) -> Result<Template, TransformError> {
		if let Some(template) = self
			.cache
			.lock()
			.ok()
			.and_then(|cache| cache.get(template_id).cloned())
		{
			return Ok(template);
		}

		let template = self
			.templates
			.find_template_by_id(template_id)
			.await
			.map_err(|e| TransformError::Lookup(e.to_string()))?
			.ok_or_else(|| TransformError::TemplateNotFound(template_id.to_string()))?;

		debug!("Resolved template {} ({})", template.id, template.name);
		if let Ok(mut cache) = self.cache.lock() {
			cache.insert(template_id.to_string(), template.clone());
		}
		Ok(template)
	}

	/// Turn one raw item into a canonical JSON object.
	pub async fn transform(&self, raw: &Value, template_id: &str) -> Result<Value, TransformError> {
		let template = self.resolve(template_id).await?;
		let output = self.engine.render(raw, &template)?;

		if !output.is_object() {
			return Err(TransformError::InvalidOutput(format!(
				"template '{}' rendered a non-object value",
				template_id
			)));
		}
		Ok(output)
	}
}
