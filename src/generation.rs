//! Meal plan and recipe generation.
//!
//! A [`GenerationProvider`] is picked once from configuration: `Live` talks to
//! an OpenAI-compatible `chat/completions` endpoint, `Fallback` returns a fixed
//! plan. Generation never fails outward; a live error is logged and the
//! fallback content is returned instead.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::models::{DailyMeals, Meal, NutritionInfo, Recipe, Snack, UserProfile};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;

const MEAL_PLAN_SYSTEM_PROMPT: &str = "You are a professional nutritionist and meal planning \
expert. Generate personalized, healthy meal plans based on user preferences, dietary \
restrictions, and health goals. Always respond with valid JSON format.";

const RECIPE_SYSTEM_PROMPT: &str = "You are a professional chef. Provide detailed, easy-to-follow \
recipes with accurate nutritional information.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("completion was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("completion endpoint returned no choices")]
    EmptyCompletion,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Status { status, body });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyCompletion)?;

        debug!(model = %self.model, chars = content.len(), "received completion");
        Ok(content)
    }

    pub async fn meal_plan(
        &self,
        profile: &UserProfile,
        date: NaiveDate,
    ) -> Result<DailyMeals, GenerationError> {
        let prompt = meal_plan_prompt(profile, date);
        let content = self
            .complete(MEAL_PLAN_SYSTEM_PROMPT, &prompt, 0.7, 2000)
            .await?;
        parse_completion(&content)
    }

    pub async fn recipe(
        &self,
        meal_name: &str,
        restrictions: &[String],
    ) -> Result<Recipe, GenerationError> {
        let prompt = recipe_prompt(meal_name, restrictions);
        let content = self
            .complete(RECIPE_SYSTEM_PROMPT, &prompt, 0.5, 1000)
            .await?;
        parse_completion(&content)
    }
}

#[derive(Debug, Clone)]
pub enum GenerationProvider {
    Live(LlmClient),
    Fallback,
}

impl GenerationProvider {
    pub fn from_config(config: &LlmConfig) -> Self {
        let Some(api_key) = config.api_key.clone() else {
            info!("no OPENAI_API_KEY set, meal plans use built-in fallback content");
            return GenerationProvider::Fallback;
        };

        match LlmClient::new(config, api_key) {
            Ok(client) => GenerationProvider::Live(client),
            Err(err) => {
                warn!(error = %err, "could not build completion client, using fallback content");
                GenerationProvider::Fallback
            }
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, GenerationProvider::Live(_))
    }

    pub async fn generate_meal_plan(&self, profile: &UserProfile, date: NaiveDate) -> DailyMeals {
        match self {
            GenerationProvider::Live(client) => match client.meal_plan(profile, date).await {
                Ok(meals) => meals,
                Err(err) => {
                    warn!(error = %err, %date, "meal plan generation failed, using fallback plan");
                    fallback_meal_plan()
                }
            },
            GenerationProvider::Fallback => fallback_meal_plan(),
        }
    }

    pub async fn generate_recipe(&self, meal_name: &str, restrictions: &[String]) -> Recipe {
        match self {
            GenerationProvider::Live(client) => match client.recipe(meal_name, restrictions).await {
                Ok(recipe) => recipe,
                Err(err) => {
                    warn!(
                        error = %err,
                        meal = meal_name,
                        "recipe generation failed, using fallback recipe"
                    );
                    fallback_recipe()
                }
            },
            GenerationProvider::Fallback => fallback_recipe(),
        }
    }
}

fn join_or(values: &[String], default: &str) -> String {
    if values.is_empty() {
        default.to_string()
    } else {
        values.join(", ")
    }
}

pub fn meal_plan_prompt(profile: &UserProfile, date: NaiveDate) -> String {
    format!(
        r#"Create a personalized daily meal plan for {date} with the following requirements:

Health Goals: {goals}
Dietary Preferences: {preferences}
Allergies: {allergies}
Disliked Ingredients: {disliked}
Available Cooking Time: {cooking_time}
Cooking Skill Level: {skill_level}

Respond with JSON in this exact format:
{{
  "breakfast": {{
    "name": "Meal Name", "description": "Brief description", "prepTime": 15,
    "calories": 400, "protein": 20, "carbs": 30, "fat": 15, "difficulty": "Easy"
  }},
  "lunch": {{
    "name": "Meal Name", "description": "Brief description", "prepTime": 25,
    "calories": 500, "protein": 25, "carbs": 40, "fat": 20, "difficulty": "Medium"
  }},
  "dinner": {{
    "name": "Meal Name", "description": "Brief description", "prepTime": 30,
    "calories": 450, "protein": 30, "carbs": 35, "fat": 18, "difficulty": "Medium"
  }},
  "snacks": [{{"name": "Snack Name", "calories": 150, "description": "Brief description"}}]
}}"#,
        date = date.format("%a %b %d %Y"),
        goals = join_or(&profile.health_goals, "general wellness"),
        preferences = join_or(&profile.dietary_preferences, "none"),
        allergies = join_or(&profile.allergies, "none"),
        disliked = join_or(&profile.disliked_ingredients, "none"),
        cooking_time = profile.cooking_time.as_deref().unwrap_or("30 minutes"),
        skill_level = profile.skill_level.as_deref().unwrap_or("intermediate"),
    )
}

pub fn recipe_prompt(meal_name: &str, restrictions: &[String]) -> String {
    format!(
        r#"Generate detailed cooking instructions for "{meal_name}".
Consider these dietary restrictions: {restrictions}.

Respond with JSON in this format:
{{
  "ingredients": ["ingredient 1", "ingredient 2"],
  "instructions": ["step 1", "step 2"],
  "prepTime": 15,
  "cookTime": 20,
  "difficulty": "Easy|Medium|Hard",
  "nutritionInfo": {{"calories": 400, "protein": 25, "carbs": 30, "fat": 15}}
}}"#,
        restrictions = join_or(restrictions, "none"),
    )
}

/// Models sometimes wrap JSON in a markdown fence.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

pub fn parse_completion<T: DeserializeOwned>(content: &str) -> Result<T, GenerationError> {
    Ok(serde_json::from_str(strip_code_fence(content))?)
}

fn meal(
    name: &str,
    description: &str,
    prep_time: u32,
    macros: (u32, u32, u32, u32),
    difficulty: &str,
) -> Meal {
    let (calories, protein, carbs, fat) = macros;
    Meal {
        name: name.to_string(),
        description: description.to_string(),
        prep_time,
        calories,
        protein,
        carbs,
        fat,
        difficulty: difficulty.to_string(),
        completed: false,
    }
}

pub fn fallback_meal_plan() -> DailyMeals {
    DailyMeals {
        breakfast: meal(
            "Avocado Toast with Poached Eggs",
            "Whole grain bread topped with smashed avocado and perfectly poached eggs",
            15,
            (420, 18, 35, 25),
            "Easy",
        ),
        lunch: meal(
            "Quinoa Buddha Bowl",
            "Colorful bowl with quinoa, roasted vegetables, and tahini dressing",
            25,
            (540, 20, 65, 22),
            "Medium",
        ),
        dinner: meal(
            "Grilled Salmon with Vegetables",
            "Fresh salmon fillet with seasonal roasted vegetables",
            30,
            (480, 35, 25, 28),
            "Medium",
        ),
        snacks: vec![Snack {
            name: "Greek Yogurt with Berries".to_string(),
            calories: 150,
            description: "Protein-rich snack with antioxidant-packed berries".to_string(),
            completed: false,
        }],
    }
}

pub fn fallback_recipe() -> Recipe {
    Recipe {
        ingredients: [
            "2 slices whole grain bread",
            "1 ripe avocado",
            "2 eggs",
            "Salt and pepper to taste",
        ]
        .iter()
        .map(|item| item.to_string())
        .collect(),
        instructions: [
            "Toast the bread slices until golden brown",
            "Mash the avocado with salt and pepper",
            "Poach the eggs in simmering water for 3-4 minutes",
            "Spread avocado on toast and top with poached eggs",
        ]
        .iter()
        .map(|step| step.to_string())
        .collect(),
        prep_time: 15,
        cook_time: 5,
        difficulty: "Easy".to_string(),
        nutrition_info: NutritionInfo {
            calories: 420,
            protein: 18,
            carbs: 35,
            fat: 25,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            health_goals: vec!["weight_loss".to_string()],
            dietary_preferences: vec!["vegetarian".to_string()],
            allergies: vec!["nuts".to_string(), "shellfish".to_string()],
            disliked_ingredients: vec!["mushrooms".to_string()],
            cooking_time: Some("30_minutes".to_string()),
            skill_level: Some("intermediate".to_string()),
        }
    }

    #[test]
    fn prompt_lists_profile_constraints() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let prompt = meal_plan_prompt(&profile(), date);
        assert!(prompt.contains("Mon Jan 15 2024"));
        assert!(prompt.contains("Health Goals: weight_loss"));
        assert!(prompt.contains("Allergies: nuts, shellfish"));
        assert!(prompt.contains("Disliked Ingredients: mushrooms"));
        assert!(prompt.contains("\"breakfast\""));
    }

    #[test]
    fn prompt_uses_defaults_for_empty_profile() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let prompt = meal_plan_prompt(&UserProfile::default(), date);
        assert!(prompt.contains("Health Goals: general wellness"));
        assert!(prompt.contains("Dietary Preferences: none"));
        assert!(prompt.contains("Available Cooking Time: 30 minutes"));
        assert!(prompt.contains("Cooking Skill Level: intermediate"));
    }

    #[test]
    fn recipe_prompt_names_meal_and_restrictions() {
        let prompt = recipe_prompt("Grilled Chicken Salad", &["gluten-free".to_string()]);
        assert!(prompt.contains("\"Grilled Chicken Salad\""));
        assert!(prompt.contains("restrictions: gluten-free."));
        assert!(recipe_prompt("Soup", &[]).contains("restrictions: none."));
    }

    #[test]
    fn parses_fenced_completion() {
        let fenced = "```json\n{\"ingredients\": [\"rice\"], \"instructions\": [\"boil\"], \
                      \"prepTime\": 5, \"cookTime\": 15, \"difficulty\": \"Easy\", \
                      \"nutritionInfo\": {\"calories\": 200, \"protein\": 4, \
                      \"carbs\": 45, \"fat\": 1}}\n```";
        let recipe: Recipe = parse_completion(fenced).unwrap();
        assert_eq!(recipe.ingredients, vec!["rice".to_string()]);
        assert_eq!(recipe.cook_time, 15);
    }

    #[test]
    fn rejects_non_json_completion() {
        let result: Result<DailyMeals, _> = parse_completion("Sorry, I can't help with that.");
        assert!(matches!(result, Err(GenerationError::Json(_))));
    }

    #[test]
    fn fallback_plan_round_trips_through_json() {
        let plan = fallback_meal_plan();
        let raw = serde_json::to_string(&plan).unwrap();
        assert!(raw.contains("\"prepTime\":15"));
        let parsed: DailyMeals = parse_completion(&raw).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn missing_api_key_selects_fallback() {
        let config = LlmConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        };
        assert!(!GenerationProvider::from_config(&config).is_live());
    }

    #[tokio::test]
    async fn fallback_provider_returns_fixed_plan() {
        let provider = GenerationProvider::Fallback;
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let meals = provider.generate_meal_plan(&profile(), date).await;
        assert_eq!(meals.breakfast.name, "Avocado Toast with Poached Eggs");
        assert_eq!(meals.snacks.len(), 1);

        let recipe = provider.generate_recipe("Anything", &[]).await;
        assert_eq!(recipe.nutrition_info.calories, 420);
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        };
        let provider = GenerationProvider::from_config(&config);
        assert!(provider.is_live());

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let meals = provider.generate_meal_plan(&UserProfile::default(), date).await;
        assert_eq!(meals, fallback_meal_plan());
    }
}
