use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    Json,
};
use common_auth::AuthContext;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::drinks::{DrinkSummary, Drink, Ingredient, StoreError, MAX_TITLE_LEN};
use crate::{ApiError, ApiResult};

#[derive(Serialize)]
pub struct DrinksResponse<T> {
    pub success: bool,
    pub drinks: Vec<T>,
}

impl<T> DrinksResponse<T> {
    fn new(drinks: Vec<T>) -> Self {
        Self { success: true, drinks }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateTitle(title) => ApiError::Unprocessable {
                code: "duplicate_title",
                message: Some(format!("a drink titled '{title}' already exists")),
            },
            other => ApiError::internal(other),
        }
    }
}

/// JSON object body, or 400 when the body is absent, unparseable or an empty object.
fn object_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Map<String, Value>> {
    match payload {
        Ok(Json(Value::Object(map))) if !map.is_empty() => Ok(map),
        Ok(_) => Err(ApiError::bad_request("empty_body")),
        Err(rejection) => {
            warn!(error = %rejection, "rejected drink payload");
            Err(ApiError::bad_request("invalid_body"))
        }
    }
}

/// Path ids that are not integers match no drink.
fn drink_id(path: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    path.map(|Path(id)| id).map_err(|_| ApiError::not_found("drink_not_found"))
}

fn parse_title(value: &Value) -> ApiResult<String> {
    match value.as_str().map(str::trim) {
        Some(title) if !title.is_empty() && title.chars().count() <= MAX_TITLE_LEN => Ok(title.to_string()),
        _ => Err(ApiError::unprocessable("invalid_title")),
    }
}

/// A recipe is a list whose entries each carry `name`, `color` and an integral `parts`.
fn parse_recipe(value: &Value) -> ApiResult<Vec<Ingredient>> {
    let Value::Array(entries) = value else {
        return Err(ApiError::unprocessable("recipe_not_a_list"));
    };
    entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<Ingredient>(entry.clone())
                .map_err(|_| ApiError::unprocessable("invalid_ingredient"))
        })
        .collect()
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(_) => false,
    }
}

pub async fn list_drinks(
    State(state): State<AppState>,
) -> ApiResult<Json<DrinksResponse<DrinkSummary>>> {
    let drinks = state.store.list().await?;
    Ok(Json(DrinksResponse::new(drinks.iter().map(Drink::short).collect())))
}

pub async fn list_drinks_detail(
    State(state): State<AppState>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let drinks = state.store.list().await?;
    Ok(Json(DrinksResponse::new(drinks)))
}

pub async fn create_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let body = object_body(payload)?;
    if is_blank(body.get("title")) || is_blank(body.get("recipe")) {
        return Err(ApiError::bad_request("missing_title_or_recipe"));
    }
    let title = parse_title(&body["title"])?;
    let recipe = parse_recipe(&body["recipe"])?;

    let drink = state.store.insert(&title, &recipe).await?;
    info!(drink_id = drink.id, subject = auth.claims.subject.as_deref(), "drink created");
    Ok(Json(DrinksResponse::new(vec![drink])))
}

pub async fn update_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let id = drink_id(path)?;
    if state.store.get(id).await?.is_none() {
        return Err(ApiError::not_found("drink_not_found"));
    }
    let body = object_body(payload)?;
    let title = body.get("title").map(parse_title).transpose()?;
    let recipe = body.get("recipe").map(parse_recipe).transpose()?;

    let drink = state
        .store
        .update(id, title.as_deref(), recipe.as_deref())
        .await?
        .ok_or(ApiError::not_found("drink_not_found"))?;
    info!(drink_id = id, subject = auth.claims.subject.as_deref(), "drink updated");
    Ok(Json(DrinksResponse::new(vec![drink])))
}

pub async fn delete_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let id = drink_id(path)?;
    if !state.store.delete(id).await? {
        return Err(ApiError::not_found("drink_not_found"));
    }
    info!(drink_id = id, subject = auth.claims.subject.as_deref(), "drink deleted");
    Ok(Json(json!({ "success": true, "delete": id })))
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("route_not_found")
}
