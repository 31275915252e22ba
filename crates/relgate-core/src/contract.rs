//! Contract validator.
//!
//! Loads a release contract, validates it against a JSON schema (structural)
//! and then semantically (non-empty family list, resolvable ids and artifact
//! paths, no duplicate ids). An invalid contract aborts the whole run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{debug, info};

use relgate_state::ContentDigest;

use crate::domain::{normalize_status, Contract, FamilySpec, RelgateError, Result};

/// Schema the contract must satisfy unless another one is supplied.
pub const CONTRACT_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "relgate release contract",
  "type": "object",
  "required": ["contract_id", "version", "freshness_policy", "default_canary_policy", "required_families"],
  "properties": {
    "contract_id": {"type": "string", "minLength": 1},
    "version": {"type": "string", "minLength": 1},
    "freshness_policy": {"enum": ["must_regenerate_this_run", "allow_latest"]},
    "default_canary_policy": {"enum": ["strict", "triage"]},
    "required_families": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["id", "artifact_path"],
        "properties": {
          "id": {"type": "string"},
          "artifact_path": {"type": "string"},
          "stage": {"enum": ["observe", "ramp", "target", "custom"]},
          "canary_policy": {"enum": ["strict", "triage"]},
          "allowed_statuses": {"type": "array", "items": {"type": "string"}},
          "canary_alert_threshold": {"type": "number", "minimum": 0, "maximum": 1}
        }
      }
    }
  }
}"#;

/// A contract that passed both structural and semantic validation.
#[derive(Debug, Clone)]
pub struct ValidatedContract {
    contract: Contract,
    by_id: HashMap<String, usize>,
    digest: ContentDigest,
    source: Option<PathBuf>,
}

impl ValidatedContract {
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Families in contract order.
    pub fn families(&self) -> &[FamilySpec] {
        &self.contract.required_families
    }

    /// O(1) lookup by family id.
    pub fn family(&self, id: &str) -> Option<&FamilySpec> {
        self.by_id
            .get(id)
            .map(|&idx| &self.contract.required_families[idx])
    }

    /// Digest of the canonical JSON the contract was parsed from.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// File the contract was loaded from; `None` for in-memory values.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Validates contracts against a compiled JSON schema.
pub struct ContractValidator {
    schema: JSONSchema,
}

impl ContractValidator {
    /// Validator using [`CONTRACT_SCHEMA`].
    pub fn embedded() -> Result<Self> {
        let schema: Value = serde_json::from_str(CONTRACT_SCHEMA)?;
        Self::from_schema(&schema)
    }

    pub fn from_schema(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::compile(schema)
            .map_err(|e| RelgateError::ContractSchema(format!("invalid JSON schema: {e}")))?;
        Ok(Self { schema })
    }

    pub fn from_schema_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let schema: Value = serde_json::from_str(&raw)?;
        Self::from_schema(&schema)
    }

    /// Read, parse and validate a contract file.
    pub fn load(&self, path: &Path) -> Result<ValidatedContract> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelgateError::ContractSchema(format!("cannot read {}: {e}", path.display()))
        })?;
        let doc: Value = serde_json::from_str(&raw).map_err(|e| {
            RelgateError::ContractSchema(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        let mut validated = self.validate_value(&doc)?;
        validated.source = Some(path.to_path_buf());
        info!(
            contract_id = %validated.contract.contract_id,
            version = %validated.contract.version,
            families = validated.contract.required_families.len(),
            "contract validated"
        );
        Ok(validated)
    }

    /// Validate an already-parsed contract document.
    pub fn validate_value(&self, doc: &Value) -> Result<ValidatedContract> {
        if let Err(errors) = self.schema.validate(doc) {
            let msgs: Vec<String> = errors
                .map(|e| {
                    let at = e.instance_path.to_string();
                    if at.is_empty() {
                        e.to_string()
                    } else {
                        format!("{at}: {e}")
                    }
                })
                .collect();
            return Err(RelgateError::ContractSchema(msgs.join("; ")));
        }

        let mut contract: Contract = serde_json::from_value(doc.clone())
            .map_err(|e| RelgateError::ContractSchema(e.to_string()))?;
        let by_id = check_semantics(&mut contract)?;
        let digest = ContentDigest::from_bytes(&serde_json::to_vec(&contract)?);
        debug!(digest = %digest.short(), "contract digest computed");

        Ok(ValidatedContract {
            contract,
            by_id,
            digest,
            source: None,
        })
    }
}

fn check_semantics(contract: &mut Contract) -> Result<HashMap<String, usize>> {
    if contract.required_families.is_empty() {
        return Err(RelgateError::ContractSchema(
            "required_families must not be empty".to_string(),
        ));
    }

    let mut by_id = HashMap::with_capacity(contract.required_families.len());
    for (idx, family) in contract.required_families.iter_mut().enumerate() {
        let id = family.id.trim().to_string();
        if id.is_empty() {
            return Err(RelgateError::ContractSchema(format!(
                "required_families[{idx}] has an empty id"
            )));
        }
        if family.artifact_path.as_os_str().is_empty() {
            return Err(RelgateError::ContractSchema(format!(
                "family {id} has an empty artifact_path"
            )));
        }
        if by_id.insert(id.clone(), idx).is_some() {
            return Err(RelgateError::ContractSchema(format!(
                "family id {id} appears more than once"
            )));
        }
        if family.allowed_statuses.is_empty() {
            return Err(RelgateError::ContractSchema(format!(
                "family {id} has an empty allowed_statuses set"
            )));
        }
        family.id = id;
        family.allowed_statuses = family
            .allowed_statuses
            .iter()
            .map(|s| normalize_status(s))
            .collect();
    }
    Ok(by_id)
}
