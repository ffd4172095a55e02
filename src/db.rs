use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::generation;
use crate::models::{
    DailyMeals, MealPlanRecord, MealSlot, ProgressEntry, UserProfile, UserRecord,
};
use crate::subscription::{self, StoredSubscription, SubscriptionTier};

pub const DEMO_EMAIL: &str = "demo@mealplan.app";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Demo user with a month of daily logs ending on `today` and a plan for today.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let profile = UserProfile {
        health_goals: vec!["weight_loss".to_string(), "more_energy".to_string()],
        dietary_preferences: vec!["mediterranean".to_string()],
        allergies: vec!["peanuts".to_string()],
        disliked_ingredients: vec!["cilantro".to_string()],
        cooking_time: Some("30 minutes".to_string()),
        skill_level: Some("intermediate".to_string()),
    };
    let user_id = upsert_profile(pool, DEMO_EMAIL, &profile, Some(68.0)).await?;

    let wobble = [0.2, -0.1, 0.0, 0.15, -0.2];
    for days_ago in 0..30i64 {
        let index = days_ago as usize;
        let entry = ProgressEntry {
            date: today - Duration::days(days_ago),
            weight: Some(72.0 - 0.1 * (29 - days_ago) as f64 + wobble[index % wobble.len()]),
            energy_level: 7 + (days_ago % 3) as i32,
            adherence_score: 80 + ((days_ago * 7) % 20) as i32,
            notes: (days_ago % 5 == 0).then(|| "Feeling great today!".to_string()),
        };

        sqlx::query(
            r#"
            INSERT INTO meal_planner.progress_logs
            (log_id, user_id, log_date, weight, energy_level, adherence_score, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, log_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(entry.date)
        .bind(entry.weight)
        .bind(entry.energy_level)
        .bind(entry.adherence_score)
        .bind(&entry.notes)
        .execute(pool)
        .await?;
    }

    if fetch_meal_plan(pool, user_id, today).await?.is_none() {
        save_meal_plan(pool, user_id, today, &generation::fallback_meal_plan()).await?;
    }

    let expires_at = subscription::paid_until(Utc::now(), 1);
    set_subscription_tier(pool, user_id, SubscriptionTier::Premium, Some(expires_at)).await?;

    info!(email = DEMO_EMAIL, "seeded demo user");
    Ok(())
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        user_id: row.get("user_id"),
        email: row.get("email"),
        profile: UserProfile {
            health_goals: row.get("health_goals"),
            dietary_preferences: row.get("dietary_preferences"),
            allergies: row.get("allergies"),
            disliked_ingredients: row.get("disliked_ingredients"),
            cooking_time: row.get("cooking_time"),
            skill_level: row.get("skill_level"),
        },
        target_weight: row.get("target_weight"),
    }
}

pub async fn find_user(pool: &PgPool, email: &str) -> anyhow::Result<Option<UserRecord>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, email, health_goals, dietary_preferences, allergies,
               disliked_ingredients, cooking_time, skill_level, target_weight
        FROM meal_planner.users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(user_from_row))
}

pub async fn require_user(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    find_user(pool, email)
        .await?
        .with_context(|| format!("no user registered with email {email}"))
}

/// Returns the id of the user with `email`, creating a bare record if needed.
pub async fn ensure_user(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let user_id: Uuid = sqlx::query(
        r#"
        INSERT INTO meal_planner.users (user_id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING user_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("user_id");

    Ok(user_id)
}

pub async fn upsert_profile(
    pool: &PgPool,
    email: &str,
    profile: &UserProfile,
    target_weight: Option<f64>,
) -> anyhow::Result<Uuid> {
    if let Some(target) = target_weight {
        anyhow::ensure!(
            target.is_finite() && target > 0.0,
            "target weight must be a positive number, got {target}"
        );
    }

    let user_id: Uuid = sqlx::query(
        r#"
        INSERT INTO meal_planner.users
        (user_id, email, health_goals, dietary_preferences, allergies,
         disliked_ingredients, cooking_time, skill_level, target_weight)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (email) DO UPDATE
        SET health_goals = EXCLUDED.health_goals,
            dietary_preferences = EXCLUDED.dietary_preferences,
            allergies = EXCLUDED.allergies,
            disliked_ingredients = EXCLUDED.disliked_ingredients,
            cooking_time = EXCLUDED.cooking_time,
            skill_level = EXCLUDED.skill_level,
            target_weight = EXCLUDED.target_weight,
            updated_at = NOW()
        RETURNING user_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(&profile.health_goals)
    .bind(&profile.dietary_preferences)
    .bind(&profile.allergies)
    .bind(&profile.disliked_ingredients)
    .bind(&profile.cooking_time)
    .bind(&profile.skill_level)
    .bind(target_weight)
    .fetch_one(pool)
    .await?
    .get("user_id");

    Ok(user_id)
}

fn entry_from_row(row: &PgRow) -> ProgressEntry {
    ProgressEntry {
        date: row.get("log_date"),
        weight: row.get("weight"),
        energy_level: row.get("energy_level"),
        adherence_score: row.get("adherence_score"),
        notes: row.get("notes"),
    }
}

pub async fn fetch_subscription(
    pool: &PgPool,
    user_id: Uuid,
) -> anyhow::Result<StoredSubscription> {
    let row = sqlx::query(
        r#"
        SELECT subscription_tier, subscription_expires_at
        FROM meal_planner.users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no user with id {user_id}"))?;

    let tier: String = row.get("subscription_tier");
    Ok(StoredSubscription {
        tier: tier.parse()?,
        expires_at: row.get("subscription_expires_at"),
    })
}

/// Basic carries no expiry, whatever `expires_at` says.
pub async fn set_subscription_tier(
    pool: &PgPool,
    user_id: Uuid,
    tier: SubscriptionTier,
    expires_at: Option<DateTime<Utc>>,
) -> anyhow::Result<StoredSubscription> {
    let expires_at = match tier {
        SubscriptionTier::Basic => None,
        _ => expires_at,
    };

    let result = sqlx::query(
        r#"
        UPDATE meal_planner.users
        SET subscription_tier = $2,
            subscription_expires_at = $3,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(tier.as_str())
    .bind(expires_at)
    .execute(pool)
    .await?;

    anyhow::ensure!(result.rows_affected() > 0, "no user with id {user_id}");
    info!(%user_id, %tier, "subscription tier updated");
    Ok(StoredSubscription { tier, expires_at })
}

pub async fn count_meal_plans_since(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM meal_planner.meal_plans
        WHERE user_id = $1 AND created_at >= $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?
    .get("total");

    Ok(count)
}

pub async fn count_progress_logs_since(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM meal_planner.progress_logs
        WHERE user_id = $1 AND created_at >= $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?
    .get("total");

    Ok(count)
}

pub async fn has_entry(pool: &PgPool, user_id: Uuid, date: NaiveDate) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM meal_planner.progress_logs WHERE user_id = $1 AND log_date = $2
        ) AS found
        "#,
    )
    .bind(user_id)
    .bind(date)
    .fetch_one(pool)
    .await?
    .get("found");

    Ok(exists)
}

/// Stores one entry per (user, date); logging the same date again replaces it.
pub async fn append_entry(
    pool: &PgPool,
    user_id: Uuid,
    entry: &ProgressEntry,
) -> anyhow::Result<ProgressEntry> {
    entry.validate()?;

    let row = sqlx::query(
        r#"
        INSERT INTO meal_planner.progress_logs
        (log_id, user_id, log_date, weight, energy_level, adherence_score, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, log_date) DO UPDATE
        SET weight = EXCLUDED.weight,
            energy_level = EXCLUDED.energy_level,
            adherence_score = EXCLUDED.adherence_score,
            notes = EXCLUDED.notes
        RETURNING log_date, weight, energy_level, adherence_score, notes
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(entry.date)
    .bind(entry.weight)
    .bind(entry.energy_level)
    .bind(entry.adherence_score)
    .bind(&entry.notes)
    .fetch_one(pool)
    .await?;

    debug!(%user_id, date = %entry.date, "progress entry stored");
    Ok(entry_from_row(&row))
}

pub async fn fetch_entries(
    pool: &PgPool,
    user_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<ProgressEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT log_date, weight, energy_level, adherence_score, notes
        FROM meal_planner.progress_logs
        WHERE user_id = $1 AND log_date >= $2 AND log_date <= $3
        ORDER BY log_date ASC
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(entry_from_row).collect())
}

pub async fn fetch_recent_entries(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<ProgressEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT log_date, weight, energy_level, adherence_score, notes
        FROM meal_planner.progress_logs
        WHERE user_id = $1
        ORDER BY log_date DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(entry_from_row).collect())
}

pub async fn delete_entry(pool: &PgPool, user_id: Uuid, date: NaiveDate) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "DELETE FROM meal_planner.progress_logs WHERE user_id = $1 AND log_date = $2",
    )
    .bind(user_id)
    .bind(date)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        log_date: NaiveDate,
        weight: Option<f64>,
        energy_level: i32,
        adherence_score: i32,
        notes: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row on line {line}"))?;
        let entry = ProgressEntry {
            date: row.log_date,
            weight: row.weight,
            energy_level: row.energy_level,
            adherence_score: row.adherence_score,
            notes: row.notes.filter(|note| !note.trim().is_empty()),
        };
        entry
            .validate()
            .with_context(|| format!("invalid entry on line {line}"))?;

        let user_id = ensure_user(pool, &row.email).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO meal_planner.progress_logs
            (log_id, user_id, log_date, weight, energy_level, adherence_score, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, log_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(entry.date)
        .bind(entry.weight)
        .bind(entry.energy_level)
        .bind(entry.adherence_score)
        .bind(&entry.notes)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

fn plan_from_row(row: &PgRow) -> MealPlanRecord {
    let meals: Json<DailyMeals> = row.get("meals");
    MealPlanRecord {
        plan_id: row.get("plan_id"),
        user_id: row.get("user_id"),
        plan_date: row.get("plan_date"),
        meals: meals.0,
        created_at: row.get("created_at"),
    }
}

pub async fn save_meal_plan(
    pool: &PgPool,
    user_id: Uuid,
    plan_date: NaiveDate,
    meals: &DailyMeals,
) -> anyhow::Result<MealPlanRecord> {
    let row = sqlx::query(
        r#"
        INSERT INTO meal_planner.meal_plans (plan_id, user_id, plan_date, meals)
        VALUES ($1, $2, $3, $4)
        RETURNING plan_id, user_id, plan_date, meals, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(plan_date)
    .bind(Json(meals))
    .fetch_one(pool)
    .await?;

    Ok(plan_from_row(&row))
}

/// Latest plan generated for `plan_date`, if any.
pub async fn fetch_meal_plan(
    pool: &PgPool,
    user_id: Uuid,
    plan_date: NaiveDate,
) -> anyhow::Result<Option<MealPlanRecord>> {
    let row = sqlx::query(
        r#"
        SELECT plan_id, user_id, plan_date, meals, created_at
        FROM meal_planner.meal_plans
        WHERE user_id = $1 AND plan_date = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(plan_date)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(plan_from_row))
}

pub async fn fetch_meal_plans(
    pool: &PgPool,
    user_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<MealPlanRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT plan_id, user_id, plan_date, meals, created_at
        FROM meal_planner.meal_plans
        WHERE user_id = $1 AND plan_date >= $2 AND plan_date <= $3
        ORDER BY plan_date ASC, created_at ASC
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(plan_from_row).collect())
}

pub async fn mark_meal_completed(
    pool: &PgPool,
    plan_id: Uuid,
    slot: MealSlot,
    completed: bool,
) -> anyhow::Result<MealPlanRecord> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT meals FROM meal_planner.meal_plans WHERE plan_id = $1 FOR UPDATE")
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("no meal plan with id {plan_id}"))?;

    let Json(mut meals): Json<DailyMeals> = row.get("meals");
    meals.set_completed(slot, completed);

    let row = sqlx::query(
        r#"
        UPDATE meal_planner.meal_plans
        SET meals = $2
        WHERE plan_id = $1
        RETURNING plan_id, user_id, plan_date, meals, created_at
        "#,
    )
    .bind(plan_id)
    .bind(Json(&meals))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(plan_from_row(&row))
}

pub async fn delete_meal_plan(pool: &PgPool, plan_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM meal_planner.meal_plans WHERE plan_id = $1")
        .bind(plan_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
