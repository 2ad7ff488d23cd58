//! # Normalized Confidence Scoring
//!
//! Combines the weights a profile lands on into one number. Each attribute value
//! is resolved to a model key, its normalized standard deviation is looked up, and
//! the confidence is `1 - product` of those weights. A profile sitting in
//! low-dispersion regions for every attribute scores close to `1.0`.
//!
//! Scoring never mutates the model, so one model may serve any number of threads.

use crate::model::{AttributeWeights, KeyWeight, WeightModel};
use crate::schema::AttributeKind;
use crate::value::{ValueKey, parse_finite};
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Value '{value}' is not a known category of attribute '{label}'.")]
    UnknownCategory { label: String, value: String },
    #[error("The profile has no value for attribute '{label}'.")]
    MissingAttribute { label: String },
    #[error("The profile sets attribute '{label}', which the model does not contain.")]
    UnexpectedAttribute { label: String },
    #[error("Value '{value}' for continuous attribute '{label}' is not a finite number.")]
    InvalidNumber { label: String, value: String },
    #[error("The weight model contains no attributes.")]
    EmptyModel,
}

/// One concrete value per model attribute, keyed by field label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    values: IndexMap<String, String>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Profile::set`].
    pub fn with(mut self, label: &str, value: impl ToString) -> Self {
        self.set(label, value);
        self
    }

    pub fn set(&mut self, label: &str, value: impl ToString) {
        self.values.insert(label.to_string(), value.to_string());
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.values.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Profile {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The nine ASCVD inputs, in the units the weight model was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct AscvdProfile {
    pub race: String,
    pub gender: String,
    pub age: f64,
    pub systolic: f64,
    pub total_cholesterol: f64,
    pub hdl: f64,
    pub diabetes: String,
    pub smoker: String,
    pub hypertension_treatment: String,
}

impl From<&AscvdProfile> for Profile {
    fn from(p: &AscvdProfile) -> Self {
        Profile::new()
            .with("race", &p.race)
            .with("gender", &p.gender)
            .with("age", p.age)
            .with("systolic", p.systolic)
            .with("total-cholesterol", p.total_cholesterol)
            .with("hdl", p.hdl)
            .with("diabetes", &p.diabetes)
            .with("smoker", &p.smoker)
            .with("on-hypertension-treatment", &p.hypertension_treatment)
    }
}

/// ASCVD inputs plus the two renal and inflammation markers of the UMRI model.
#[derive(Debug, Clone, PartialEq)]
pub struct UmriProfile {
    pub ascvd: AscvdProfile,
    pub egfr: f64,
    pub hscrp: f64,
}

impl From<&UmriProfile> for Profile {
    fn from(p: &UmriProfile) -> Self {
        Profile::from(&p.ascvd)
            .with("egfr", p.egfr)
            .with("hscrp", p.hscrp)
    }
}

/// How one profile value was matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFactor {
    pub label: String,
    pub requested: String,
    pub key: ValueKey,
    pub normalized_std: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceBreakdown {
    /// In model attribute order.
    pub factors: Vec<ResolvedFactor>,
    pub product: f64,
    pub confidence: f64,
}

/// The key closest to `value`, or `None` if no key is numeric.
///
/// An exact match wins outright. Otherwise the smallest absolute distance wins and
/// ties go to the key seen first.
pub fn nearest_key(weights: &[KeyWeight], value: f64) -> Option<&KeyWeight> {
    let mut best: Option<(&KeyWeight, f64)> = None;
    for weight in weights {
        let Some(key) = weight.key.as_f64() else {
            continue;
        };
        let distance = (key - value).abs();
        if distance == 0.0 {
            return Some(weight);
        }
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((weight, distance));
        }
    }
    best.map(|(weight, _)| weight)
}

fn resolve_attribute<'m>(
    attribute: &'m AttributeWeights,
    raw: &str,
) -> Result<&'m KeyWeight, ScoreError> {
    let label = attribute.label();
    let numeric_keys = attribute.has_numeric_keys();

    if attribute.kind() == AttributeKind::Continuous && numeric_keys {
        let value = parse_finite(raw).ok_or_else(|| ScoreError::InvalidNumber {
            label: label.to_string(),
            value: raw.to_string(),
        })?;
        return nearest_key(attribute.weights(), value).ok_or(ScoreError::EmptyModel);
    }

    let unknown = || ScoreError::UnknownCategory {
        label: label.to_string(),
        value: raw.to_string(),
    };
    let key = if numeric_keys {
        ValueKey::Numeric(parse_finite(raw).ok_or_else(unknown)?)
    } else {
        ValueKey::Text(raw.to_string())
    };
    attribute
        .weights()
        .iter()
        .find(|w| w.key == key)
        .ok_or_else(unknown)
}

/// Resolves every profile value and reports the per-attribute factors.
///
/// The profile must set exactly the model's attributes. Nothing is computed until
/// every attribute has resolved, so a failing query never yields a partial score.
pub fn explain_confidence(
    model: &WeightModel,
    profile: &Profile,
) -> Result<ConfidenceBreakdown, ScoreError> {
    if model.attributes().is_empty() {
        return Err(ScoreError::EmptyModel);
    }
    for (label, _) in profile.iter() {
        if model.attribute(label).is_none() {
            return Err(ScoreError::UnexpectedAttribute {
                label: label.to_string(),
            });
        }
    }

    let mut factors = Vec::with_capacity(model.attributes().len());
    for attribute in model.attributes() {
        let raw = profile
            .get(attribute.label())
            .ok_or_else(|| ScoreError::MissingAttribute {
                label: attribute.label().to_string(),
            })?;
        let weight = resolve_attribute(attribute, raw)?;
        factors.push(ResolvedFactor {
            label: attribute.label().to_string(),
            requested: raw.to_string(),
            key: weight.key.clone(),
            normalized_std: weight.normalized_std,
        });
    }

    let product: f64 = factors.iter().map(|f| f.normalized_std).product();
    Ok(ConfidenceBreakdown {
        factors,
        product,
        confidence: 1.0 - product,
    })
}

/// `1 - product` of the normalized standard deviations the profile resolves to.
///
/// No clamping is applied; the result lies in `[0, 1]` whenever every weight does.
pub fn normalized_confidence(model: &WeightModel, profile: &Profile) -> Result<f64, ScoreError> {
    explain_confidence(model, profile).map(|b| b.confidence)
}
