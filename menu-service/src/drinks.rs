use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;

pub const MAX_TITLE_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: i64,
}

/// Full drink representation, as returned to staff with `get:drinks-detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drink {
    pub id: i64,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

/// Public menu entry: the recipe keeps only colour and proportion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrinkSummary {
    pub id: i64,
    pub title: String,
    pub recipe: Vec<IngredientSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientSummary {
    pub color: String,
    pub parts: i64,
}

impl Drink {
    pub fn short(&self) -> DrinkSummary {
        DrinkSummary {
            id: self.id,
            title: self.title.clone(),
            recipe: self
                .recipe
                .iter()
                .map(|ingredient| IngredientSummary {
                    color: ingredient.color.clone(),
                    parts: ingredient.parts,
                })
                .collect(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DrinkRow {
    id: i64,
    title: String,
    recipe: String,
}

impl TryFrom<DrinkRow> for Drink {
    type Error = StoreError;

    fn try_from(row: DrinkRow) -> Result<Self, Self::Error> {
        let recipe = serde_json::from_str(&row.recipe).map_err(|source| StoreError::CorruptRecipe {
            id: row.id,
            source,
        })?;
        Ok(Drink {
            id: row.id,
            title: row.title,
            recipe,
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a drink titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("stored recipe for drink {id} is not valid JSON: {source}")]
    CorruptRecipe {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("recipe could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

fn classify(err: sqlx::Error, title: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateTitle(title.to_string())
        }
        _ => StoreError::Database(err),
    }
}

/// SQLite-backed drink persistence. The recipe is stored as a JSON array.
#[derive(Clone)]
pub struct DrinkStore {
    pool: SqlitePool,
}

impl DrinkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the pool and bring the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn list(&self) -> Result<Vec<Drink>, StoreError> {
        let rows = sqlx::query_as::<_, DrinkRow>("SELECT id, title, recipe FROM drinks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Drink::try_from).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<Drink>, StoreError> {
        let row = sqlx::query_as::<_, DrinkRow>("SELECT id, title, recipe FROM drinks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Drink::try_from).transpose()
    }

    pub async fn insert(&self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError> {
        let encoded = serde_json::to_string(recipe)?;
        let row = sqlx::query_as::<_, DrinkRow>(
            "INSERT INTO drinks (title, recipe) VALUES (?, ?) RETURNING id, title, recipe",
        )
        .bind(title)
        .bind(encoded)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify(err, title))?;
        Drink::try_from(row)
    }

    /// Apply the provided fields; `None` leaves the column untouched.
    /// Returns `Ok(None)` when no drink has `id`.
    pub async fn update(
        &self,
        id: i64,
        title: Option<&str>,
        recipe: Option<&[Ingredient]>,
    ) -> Result<Option<Drink>, StoreError> {
        let encoded = recipe.map(serde_json::to_string).transpose()?;
        let row = sqlx::query_as::<_, DrinkRow>(
            "UPDATE drinks SET title = COALESCE(?, title), recipe = COALESCE(?, recipe)\n             WHERE id = ?\n             RETURNING id, title, recipe",
        )
        .bind(title)
        .bind(encoded)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| classify(err, title.unwrap_or_default()))?;
        row.map(Drink::try_from).transpose()
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM drinks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert the demo `water` drink unless a drink with that title exists.
    pub async fn seed_demo(&self) -> Result<(), StoreError> {
        let recipe = serde_json::to_string(&[Ingredient {
            name: "water".into(),
            color: "blue".into(),
            parts: 1,
        }])?;
        let inserted = sqlx::query("INSERT OR IGNORE INTO drinks (title, recipe) VALUES (?, ?)")
            .bind("water")
            .bind(recipe)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if inserted > 0 {
            tracing::info!("seeded demo drink");
        }
        Ok(())
    }
}
