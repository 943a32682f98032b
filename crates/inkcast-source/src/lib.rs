//! Weather illustration source.
//!
//! Turns a free-form location into a postcard-style illustration of its
//! current weather:
//! 1. a chat model resolves the location to coordinates, a timezone and a
//!    temperature unit (through a forced tool call),
//! 2. the weather service describes the current conditions there,
//! 3. the chat model writes an image prompt from that description,
//! 4. the image model draws it and the result is downloaded and decoded.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Upstream service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model used for the tool calls
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used to draw the illustration
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Requested image size (e.g., "1792x1024")
    #[serde(default = "default_image_size")]
    pub image_size: String,

    #[serde(default = "default_image_quality")]
    pub image_quality: String,

    /// Current-conditions endpoint of the weather service
    #[serde(default = "default_weather_url")]
    pub weather_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            image_quality: default_image_quality(),
            weather_url: default_weather_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1792x1024".to_string()
}

fn default_image_quality() -> String {
    "hd".to_string()
}

fn default_weather_url() -> String {
    "https://blixt--sol-mate-weather-api.modal.run/current".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    180
}

/// Temperature unit preferred at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Weather service query resolved from a location name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub temperature_unit: TemperatureUnit,
}

#[derive(Debug, Deserialize)]
struct WeatherReport {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagePrompt {
    prompt: String,
}

const WEATHER_TOOL: &str = "get_weather";
const IMAGE_TOOL: &str = "generate_image";

/// Client for the full location-to-illustration pipeline.
pub struct WeatherIllustrator {
    http: reqwest::Client,
    config: SourceConfig,
    api_key: String,
}

impl WeatherIllustrator {
    /// Creates an illustrator, reading the API key from the configured
    /// environment variable.
    pub fn from_env(config: SourceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;
        Self::new(config, api_key)
    }

    pub fn new(config: SourceConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Runs the whole pipeline for `location`.
    pub async fn illustrate(&self, location: &str) -> Result<DynamicImage> {
        let query = self.weather_query(location).await?;
        info!("Parameters for {}: {:?}", location, query);

        let status = self.current_weather(&query).await?;
        info!("Weather for {}: {}", location, status);

        let prompt = self.image_prompt(location, &status).await?;
        info!("Prompt: {}", prompt);

        info!("Generating the image");
        self.generate_image(&prompt).await
    }

    /// Resolves a location to weather service parameters.
    pub async fn weather_query(&self, location: &str) -> Result<WeatherQuery> {
        let tool = json!({
            "type": "function",
            "function": {
                "name": WEATHER_TOOL,
                "description": "Look up the current weather at a point on Earth.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "latitude": {
                            "type": "number",
                            "description": "Latitude of the place."
                        },
                        "longitude": {
                            "type": "number",
                            "description": "Longitude of the place."
                        },
                        "timezone": {
                            "type": "string",
                            "description": "IANA timezone in use at the coordinates."
                        },
                        "temperature_unit": {
                            "type": "string",
                            "description": "Temperature unit people at the place would expect.",
                            "enum": ["celsius", "fahrenheit"]
                        }
                    },
                    "required": ["latitude", "longitude", "timezone", "temperature_unit"]
                }
            }
        });
        self.call_tool(weather_prompt(location), tool, WEATHER_TOOL)
            .await
            .with_context(|| format!("Failed to resolve location {:?}", location))
    }

    /// Fetches a text description of the current weather.
    pub async fn current_weather(&self, query: &WeatherQuery) -> Result<String> {
        let response = self
            .http
            .get(&self.config.weather_url)
            .query(query)
            .send()
            .await
            .context("Weather request failed")?
            .error_for_status()
            .context("Weather service returned an error")?;
        let report: WeatherReport = response
            .json()
            .await
            .context("Invalid weather response")?;
        Ok(report.status)
    }

    /// Asks the chat model for an illustration prompt.
    pub async fn image_prompt(&self, location: &str, weather: &str) -> Result<String> {
        let tool = json!({
            "type": "function",
            "function": {
                "name": IMAGE_TOOL,
                "description": "Draw an illustration from a detailed description.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Detailed description of the illustration, about 150 words."
                        }
                    },
                    "required": ["prompt"]
                }
            }
        });
        let args: ImagePrompt = self
            .call_tool(illustration_prompt(location, weather), tool, IMAGE_TOOL)
            .await
            .context("Failed to write image prompt")?;
        Ok(args.prompt)
    }

    /// Draws `prompt` and downloads the result.
    pub async fn generate_image(&self, prompt: &str) -> Result<DynamicImage> {
        let body = json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.config.image_size,
            "quality": self.config.image_quality,
        });
        let response: ImageResponse = self
            .http
            .post(format!("{}/images/generations", self.config.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Image generation request failed")?
            .error_for_status()
            .context("Image generation returned an error")?
            .json()
            .await
            .context("Invalid image generation response")?;

        let url = image_url(response)?;
        self.download(&url).await
    }

    async fn download(&self, url: &str) -> Result<DynamicImage> {
        debug!("Downloading {}", url);
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .context("Image download failed")?
            .error_for_status()
            .context("Image download returned an error")?
            .bytes()
            .await
            .context("Image download interrupted")?;
        debug!("Downloaded {} bytes", bytes.len());

        image::load_from_memory(&bytes).context("Failed to decode downloaded image")
    }

    async fn call_tool<T: DeserializeOwned>(
        &self,
        prompt: String,
        tool: Value,
        name: &str,
    ) -> Result<T> {
        let body = json!({
            "model": self.config.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "tools": [tool],
            "tool_choice": { "type": "function", "function": { "name": name } },
        });
        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat request failed")?
            .error_for_status()
            .context("Chat completion returned an error")?
            .json()
            .await
            .context("Invalid chat completion response")?;

        tool_arguments(response, name)
    }
}

/// Decodes the arguments of the first call to `name`.
fn tool_arguments<T: DeserializeOwned>(response: ChatResponse, name: &str) -> Result<T> {
    let call = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Chat completion has no choices"))?
        .message
        .tool_calls
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Model did not call {}", name))?;
    if call.function.name != name {
        bail!("Model called {} instead of {}", call.function.name, name);
    }
    serde_json::from_str(&call.function.arguments)
        .with_context(|| format!("Invalid arguments for {}", name))
}

fn image_url(response: ImageResponse) -> Result<String> {
    let image = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Image generation returned no images"))?;
    if let Some(revised) = &image.revised_prompt {
        info!("Revised prompt: {}", revised);
    }
    image
        .url
        .ok_or_else(|| anyhow!("Image generation returned no URL"))
}

fn weather_prompt(location: &str) -> String {
    format!(
        "Look up the current weather for {location}. If {location} is not a \
         real place on Earth, use the real place that looks the most like it. \
         First decide which temperature unit people there would normally use, \
         and request the weather in that unit."
    )
}

fn illustration_prompt(location: &str, weather: &str) -> String {
    format!(
        r#"Current weather at "{location}":

{weather}

Write a prompt for an image model that draws a wide postcard illustration of
one iconic, attractive scene in or near this place, filling the whole image.
If the place is small, like a neighborhood, stay there; if it is broad, pick
something recognizable without leaning on clichés.

Show the weather through concrete visual details and describe the color of the
sky from the position of the sun, or the moon at night. Refer to the time of
day with a general word such as "morning", "dusk" or "at night" rather than a
clock time.

Early in the prompt, as its second sentence, state that large text on top of
the illustration reads the place name and the temperature, for example
'Oslo 12°C'. Describe the lettering with clear visual keywords in a style that
suits the place, the weather and the time of day. No other text may appear.

Include people doing something interesting, dressed for the conditions.
Mention umbrellas only when it rains and coats only when it is cold. Add a
local celebration only if one would normally happen today.

Keep the prompt around 100 words, in plain language, with no negatives."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_response(name: &str, arguments: &str) -> ChatResponse {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": name, "arguments": arguments }
                    }]
                }
            }]
        });
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_weather_arguments() {
        let response = chat_response(
            WEATHER_TOOL,
            r#"{"latitude": 59.91, "longitude": 10.75, "timezone": "Europe/Oslo", "temperature_unit": "celsius"}"#,
        );
        let query: WeatherQuery = tool_arguments(response, WEATHER_TOOL).unwrap();
        assert_eq!(
            query,
            WeatherQuery {
                latitude: 59.91,
                longitude: 10.75,
                timezone: "Europe/Oslo".to_string(),
                temperature_unit: TemperatureUnit::Celsius,
            }
        );
    }

    #[test]
    fn test_prompt_arguments() {
        let response = chat_response(IMAGE_TOOL, r#"{"prompt": "A harbor at dusk"}"#);
        let args: ImagePrompt = tool_arguments(response, IMAGE_TOOL).unwrap();
        assert_eq!(args.prompt, "A harbor at dusk");
    }

    #[test]
    fn test_missing_tool_call() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Sure!" } }]
        }))
        .unwrap();
        let err = tool_arguments::<ImagePrompt>(response, IMAGE_TOOL).unwrap_err();
        assert!(err.to_string().contains("did not call"));
    }

    #[test]
    fn test_wrong_tool_or_bad_arguments() {
        let response = chat_response("something_else", "{}");
        assert!(tool_arguments::<ImagePrompt>(response, IMAGE_TOOL).is_err());

        let response = chat_response(
            WEATHER_TOOL,
            r#"{"latitude": 1.0, "longitude": 2.0, "timezone": "UTC", "temperature_unit": "kelvin"}"#,
        );
        assert!(tool_arguments::<WeatherQuery>(response, WEATHER_TOOL).is_err());
    }

    #[test]
    fn test_image_url() {
        let response: ImageResponse = serde_json::from_value(json!({
            "created": 1,
            "data": [{ "url": "https://example.com/a.png", "revised_prompt": "A harbor" }]
        }))
        .unwrap();
        assert_eq!(image_url(response).unwrap(), "https://example.com/a.png");

        let empty: ImageResponse = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert!(image_url(empty).is_err());

        let no_url: ImageResponse =
            serde_json::from_value(json!({ "data": [{ "b64_json": "AAAA" }] })).unwrap();
        assert!(image_url(no_url).is_err());
    }

    #[test]
    fn test_prompts_mention_inputs() {
        assert!(weather_prompt("Gotham").contains("Gotham"));
        let prompt = illustration_prompt("Bergen", "Light rain, 9°C");
        assert!(prompt.contains("\"Bergen\""));
        assert!(prompt.contains("Light rain, 9°C"));
    }

    #[test]
    fn test_config_defaults() {
        let config: SourceConfig = toml::from_str("chat_model = \"gpt-4o-mini\"").unwrap();
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.image_model, "dall-e-3");
        assert_eq!(config.image_size, "1792x1024");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_missing_api_key() {
        let config = SourceConfig {
            api_key_env: "INKCAST_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..SourceConfig::default()
        };
        assert!(WeatherIllustrator::from_env(config).is_err());
    }
}
