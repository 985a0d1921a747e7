//! Client for the vision model that recognises foods in a meal photo.
//!
//! The service is any OpenAI-compatible chat-completions endpoint. Its
//! answers are free text that is supposed to contain JSON (or a bare number
//! in calories-only mode); models like to wrap that in markdown fences, so
//! replies are cleaned before parsing. Anything that still fails to parse is
//! an error for the caller, never a silent zero.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::models::{FoodAnalysis, FoodItem, NutritionInfo};

const FULL_MAX_TOKENS: u32 = 1000;
const CALORIES_MAX_TOKENS: u32 = 10;
const TEMPERATURE: f32 = 0.2;

const FULL_PROMPT: &str = r#"Analyze this food image and return JSON with the following shape:

{
  "foods": [
    {
      "name": "Food name",
      "estimatedPortion": "Estimated portion (e.g. 1 plate, 2 tablespoons, 100g)",
      "calories": estimated_calories,
      "protein": grams_of_protein,
      "carbs": grams_of_carbohydrates,
      "fat": grams_of_fat,
      "confidence": confidence_from_0_to_1
    }
  ]
}

Important:
1. Identify EVERY food visible in the image
2. Estimate each portion from its visual size
3. Use values from standard nutrition reference tables
4. List multiple foods separately
5. "confidence" reflects how sure you are of the identification (0.0 to 1.0)
6. Use common household portions (tablespoon, cup, plate, unit)
7. Be precise and conservative with calorie estimates

Return ONLY the JSON, with no additional text."#;

const CALORIES_PROMPT: &str = "Analyze this food image and return ONLY a number: \
the estimated total calories. Be precise and conservative. \
Return just the number, with no additional text.";

/// Which answer the vision model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Full,
    /// Single total-calorie estimate; cheaper and faster
    Calories,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisReport {
    Full(FoodAnalysis),
    Calories(i64),
}

/// A base64-encoded photo ready to be sent.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    base64: String,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("base64_len", &self.base64.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            base64: STANDARD.encode(bytes),
        }
    }

    /// Accepts raw base64 or a `data:image/...;base64,` URL.
    pub fn from_base64(data: impl Into<String>) -> Self {
        let data = data.into();
        let base64 = match data.split_once(',') {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest.to_string(),
            _ => data,
        };
        Self {
            base64: base64.trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base64.is_empty()
    }

    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct FoodAnalyzer {
    client: Client,
    config: AnalysisConfig,
}

impl FoodAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AnalysisConfig::from_env()?)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Identify every food on the plate with per-item macro estimates.
    pub async fn analyze(&self, image: &ImagePayload) -> Result<FoodAnalysis> {
        let content = self.complete(FULL_PROMPT, image, FULL_MAX_TOKENS).await?;
        parse_food_analysis(&content)
    }

    /// Estimate only the plate's total calories.
    pub async fn analyze_calories(&self, image: &ImagePayload) -> Result<i64> {
        let content = self
            .complete(CALORIES_PROMPT, image, CALORIES_MAX_TOKENS)
            .await?;
        parse_calorie_estimate(&content)
    }

    pub async fn analyze_with_mode(
        &self,
        image: &ImagePayload,
        mode: AnalysisMode,
    ) -> Result<AnalysisReport> {
        match mode {
            AnalysisMode::Full => self.analyze(image).await.map(AnalysisReport::Full),
            AnalysisMode::Calories => self
                .analyze_calories(image)
                .await
                .map(AnalysisReport::Calories),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        image: &ImagePayload,
        max_tokens: u32,
    ) -> Result<String> {
        if image.is_empty() {
            return Err(Error::Validation("no image supplied".to_string()));
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image.data_url() } }
                ]
            }],
            "max_tokens": max_tokens,
            "temperature": TEMPERATURE
        });

        debug!(model = %self.config.model, max_tokens, "sending food analysis request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, "food analysis request failed");
            return Err(Error::Api { status, body });
        }

        let text = resp.text().await?;
        extract_completion_content(&text)
    }
}

fn extract_completion_content(body: &str) -> Result<String> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected completion body: {}", e)))?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::MalformedResponse("completion contained no answer".to_string()))
}

/// Strip a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };

    let inner = inner.trim();
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse a full-mode answer into foods plus summed totals.
pub fn parse_food_analysis(content: &str) -> Result<FoodAnalysis> {
    let cleaned = strip_code_fences(content);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| Error::MalformedResponse(format!("answer is not valid JSON: {}", e)))?;

    let items = value
        .get("foods")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::MalformedResponse("answer has no `foods` list".to_string()))?;

    let foods: Vec<FoodItem> = items.iter().filter_map(parse_food_item).collect();
    let total_nutrition: NutritionInfo = foods.iter().map(FoodItem::nutrition).sum();

    Ok(FoodAnalysis {
        foods,
        total_nutrition,
    })
}

/// Items without a name are dropped; missing or non-numeric values count as zero.
fn parse_food_item(item: &Value) -> Option<FoodItem> {
    let name = item
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let number = |key: &str| -> f64 {
        item.get(key)
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
            .unwrap_or(0.0)
    };

    let estimated_portion = item
        .get("estimatedPortion")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Some(FoodItem {
        name,
        estimated_portion,
        calories: number("calories"),
        protein: number("protein"),
        carbs: number("carbs"),
        fat: number("fat"),
        confidence: number("confidence"),
    })
}

/// Parse a calories-mode answer: the leading non-negative integer of the reply.
pub fn parse_calorie_estimate(content: &str) -> Result<i64> {
    let cleaned = strip_code_fences(content);
    if cleaned.starts_with('-') {
        return Err(Error::MalformedResponse(format!(
            "negative calorie count {:?}",
            cleaned
        )));
    }
    let digits_start = usize::from(cleaned.starts_with('+'));
    let digits_len = cleaned[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    if digits_len == 0 {
        return Err(Error::MalformedResponse(format!(
            "expected a calorie count, got {:?}",
            cleaned
        )));
    }

    cleaned[..digits_start + digits_len]
        .parse()
        .map_err(|e| Error::MalformedResponse(format!("calorie count out of range: {}", e)))
}
