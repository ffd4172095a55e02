use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod config;
mod db;
mod generation;
mod logging;
mod models;
mod report;
mod stats;
mod subscription;

use crate::config::AppConfig;
use crate::generation::GenerationProvider;
use crate::models::{MealPlanRecord, MealSlot, ProgressEntry, UserProfile};
use crate::subscription::{SubscriptionStatus, SubscriptionTier, PRICING_PLANS};

#[derive(Parser)]
#[command(name = "mealplan-progress")]
#[command(about = "Meal plans and progress tracking for health goals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo user with a month of progress
    Seed,
    /// Create or update a user's dietary profile and goal
    Profile {
        #[arg(long)]
        email: String,
        #[arg(long, value_delimiter = ',')]
        goals: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        preferences: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        allergies: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        disliked: Vec<String>,
        #[arg(long)]
        cooking_time: Option<String>,
        #[arg(long)]
        skill_level: Option<String>,
        #[arg(long)]
        target_weight: Option<f64>,
    },
    /// Record progress for a day (defaults to today)
    Log {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        energy: i32,
        #[arg(long)]
        adherence: i32,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Import progress entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List recent progress entries
    History {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },
    /// Remove the progress entry for a day
    Forget {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Summarize recent progress
    Stats {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 30)]
        limit: i64,
        /// Overrides the target weight stored on the profile
        #[arg(long)]
        target_weight: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Weekly averages for a window ending today
    Weekly {
        #[arg(long)]
        email: String,
        #[arg(
            long,
            default_value_t = 4,
            value_parser = clap::value_parser!(u32).range(1..=520)
        )]
        weeks: u32,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown progress report
    Report {
        #[arg(long)]
        email: String,
        #[arg(
            long,
            default_value_t = 4,
            value_parser = clap::value_parser!(u32).range(1..=520)
        )]
        weeks: u32,
        #[arg(long, default_value = "progress-report.md")]
        out: PathBuf,
    },
    /// Generate and store a meal plan (defaults to today)
    Plan {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the stored meal plan for a day
    ShowPlan {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List stored meal plans in a date range
    Plans {
        #[arg(long)]
        email: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Mark a meal in a stored plan as eaten
    CompleteMeal {
        #[arg(long)]
        plan_id: Uuid,
        #[arg(long, value_enum)]
        slot: MealSlot,
        /// Clear the completed flag instead
        #[arg(long)]
        undo: bool,
    },
    /// Delete a stored meal plan
    DropPlan {
        #[arg(long)]
        plan_id: Uuid,
    },
    /// Cooking instructions for a meal
    Recipe {
        #[arg(long)]
        meal: String,
        #[arg(long, value_delimiter = ',')]
        restrictions: Vec<String>,
    },
    /// Inspect or change a user's subscription tier
    Subscription {
        #[command(subcommand)]
        action: SubscriptionCommand,
    },
}

#[derive(Subcommand)]
enum SubscriptionCommand {
    /// Tier, expiry and this month's usage
    Show {
        #[arg(long)]
        email: String,
        #[arg(long)]
        json: bool,
    },
    /// Switch a user to a tier; paid tiers run for `--months` 30-day months
    Set {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        tier: SubscriptionTier,
        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u32).range(1..=36)
        )]
        months: u32,
    },
    /// List the available tiers and their prices
    Plans,
}

async fn current_subscription(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> anyhow::Result<SubscriptionStatus> {
    let stored = db::fetch_subscription(pool, user_id).await?;
    Ok(subscription::subscription_status(stored, Utc::now()))
}

fn print_plan(plan: &MealPlanRecord) {
    let meals = &plan.meals;
    let mark = |done: bool| if done { "x" } else { " " };

    println!("Meal plan {} for {}:", plan.plan_id, plan.plan_date);
    for (slot, meal) in [
        ("Breakfast", &meals.breakfast),
        ("Lunch", &meals.lunch),
        ("Dinner", &meals.dinner),
    ] {
        println!(
            "- [{}] {}: {} ({} kcal, {} min, {})",
            mark(meal.completed),
            slot,
            meal.name,
            meal.calories,
            meal.prep_time,
            meal.difficulty
        );
    }
    for snack in meals.snacks.iter() {
        println!(
            "- [{}] Snack: {} ({} kcal)",
            mark(snack.completed),
            snack.name,
            snack.calories
        );
    }
    println!("Total: {} kcal", meals.total_calories());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, today).await?;
            println!("Seed data inserted for {}.", db::DEMO_EMAIL);
        }
        Commands::Profile {
            email,
            goals,
            preferences,
            allergies,
            disliked,
            cooking_time,
            skill_level,
            target_weight,
        } => {
            let profile = UserProfile {
                health_goals: goals,
                dietary_preferences: preferences,
                allergies,
                disliked_ingredients: disliked,
                cooking_time,
                skill_level,
            };
            db::upsert_profile(&pool, &email, &profile, target_weight).await?;
            println!("Profile saved for {email}.");
        }
        Commands::Log {
            email,
            date,
            weight,
            energy,
            adherence,
            notes,
        } => {
            let user_id = db::ensure_user(&pool, &email).await?;
            let entry = ProgressEntry {
                date: date.unwrap_or(today),
                weight,
                energy_level: energy,
                adherence_score: adherence,
                notes,
            };
            entry.validate()?;

            // Replacing an existing day's entry does not use up the allowance.
            if !db::has_entry(&pool, user_id, entry.date).await? {
                let status = current_subscription(&pool, user_id).await?;
                let tier = status.effective_tier;
                let since = subscription::usage_period_start(today);
                let used = db::count_progress_logs_since(&pool, user_id, since).await?;
                let limit = tier.plan().limits.progress_logs_per_month;
                subscription::ensure_within(limit, used, "progress logs", tier)?;
            }

            let stored = db::append_entry(&pool, user_id, &entry).await?;
            println!(
                "Logged {} for {}: weight {}, energy {}/10, adherence {}%.",
                stored.date,
                email,
                report::format_weight(stored.weight),
                stored.energy_level,
                stored.adherence_score
            );
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} entries from {}.", csv.display());
        }
        Commands::History { email, limit } => {
            let user = db::require_user(&pool, &email).await?;
            let entries = db::fetch_recent_entries(&pool, user.user_id, limit).await?;

            if entries.is_empty() {
                println!("No progress logged yet.");
                return Ok(());
            }

            for entry in entries.iter() {
                println!(
                    "- {}: weight {}, energy {}/10, adherence {}%{}",
                    entry.date,
                    report::format_weight(entry.weight),
                    entry.energy_level,
                    entry.adherence_score,
                    entry
                        .notes
                        .as_deref()
                        .map(|note| format!(" ({note})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Forget { email, date } => {
            let user = db::require_user(&pool, &email).await?;
            if db::delete_entry(&pool, user.user_id, date).await? {
                println!("Removed entry for {date}.");
            } else {
                println!("No entry recorded on {date}.");
            }
        }
        Commands::Stats {
            email,
            limit,
            target_weight,
            json,
        } => {
            let user = db::require_user(&pool, &email).await?;
            let entries = db::fetch_recent_entries(&pool, user.user_id, limit).await?;
            let target = target_weight.or(user.target_weight);
            let summary = stats::compute_stats(&entries, target);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("Progress across {} entries:", entries.len());
            println!("- Current weight: {}", report::format_weight(summary.current_weight));
            println!("- Weight change: {:+.1}", summary.weight_change);
            println!("- Average energy: {:.1}/10", summary.average_energy_level);
            println!("- Average adherence: {}%", summary.average_adherence);
            println!("- Progress toward goal: {}", report::format_goal(&summary, target));
            println!("- Trend: {}", summary.trend);
        }
        Commands::Weekly { email, weeks, json } => {
            let user = db::require_user(&pool, &email).await?;
            let start = stats::window_start(today, weeks);
            let entries =
                db::fetch_entries(&pool, user.user_id, start, stats::window_end(start, weeks))
                    .await?;
            let summaries = stats::weekly_summary(&entries, start, weeks);

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
                return Ok(());
            }

            if summaries.is_empty() {
                println!("No progress logged in the last {weeks} weeks.");
                return Ok(());
            }

            for week in summaries.iter() {
                println!("- {}", report::format_week(week));
            }
        }
        Commands::Report { email, weeks, out } => {
            let user = db::require_user(&pool, &email).await?;
            let start = stats::window_start(today, weeks);
            let entries =
                db::fetch_entries(&pool, user.user_id, start, stats::window_end(start, weeks))
                    .await?;
            let report =
                report::build_report(&user.email, start, weeks, &entries, user.target_weight);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Plan { email, date } => {
            let user = db::require_user(&pool, &email).await?;
            let plan_date = date.unwrap_or(today);

            let status = current_subscription(&pool, user.user_id).await?;
            let tier = status.effective_tier;
            let since = subscription::usage_period_start(today);
            let used = db::count_meal_plans_since(&pool, user.user_id, since).await?;
            let limit = tier.plan().limits.meal_plans_per_month;
            subscription::ensure_within(limit, used, "meal plans", tier)?;

            let provider = GenerationProvider::from_config(&config.llm);
            info!(live = provider.is_live(), %plan_date, "generating meal plan");

            let meals = provider.generate_meal_plan(&user.profile, plan_date).await;
            let plan = db::save_meal_plan(&pool, user.user_id, plan_date, &meals).await?;
            print_plan(&plan);
        }
        Commands::ShowPlan { email, date, json } => {
            let user = db::require_user(&pool, &email).await?;
            let plan_date = date.unwrap_or(today);
            let Some(plan) = db::fetch_meal_plan(&pool, user.user_id, plan_date).await? else {
                println!("No meal plan stored for {plan_date}.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
        Commands::Plans { email, from, to } => {
            anyhow::ensure!(from <= to, "--from must not be after --to");
            let user = db::require_user(&pool, &email).await?;
            let plans = db::fetch_meal_plans(&pool, user.user_id, from, to).await?;

            if plans.is_empty() {
                println!("No meal plans between {from} and {to}.");
                return Ok(());
            }

            for plan in plans.iter() {
                println!(
                    "- {} {}: {}, {}, {} ({} kcal)",
                    plan.plan_date,
                    plan.plan_id,
                    plan.meals.breakfast.name,
                    plan.meals.lunch.name,
                    plan.meals.dinner.name,
                    plan.meals.total_calories()
                );
            }
        }
        Commands::CompleteMeal {
            plan_id,
            slot,
            undo,
        } => {
            let plan = db::mark_meal_completed(&pool, plan_id, slot, !undo).await?;
            print_plan(&plan);
        }
        Commands::DropPlan { plan_id } => {
            if db::delete_meal_plan(&pool, plan_id).await? {
                println!("Deleted meal plan {plan_id}.");
            } else {
                println!("No meal plan with id {plan_id}.");
            }
        }
        Commands::Recipe { meal, restrictions } => {
            let provider = GenerationProvider::from_config(&config.llm);
            let recipe = provider.generate_recipe(&meal, &restrictions).await;

            println!(
                "{meal} ({}, prep {} min, cook {} min)",
                recipe.difficulty, recipe.prep_time, recipe.cook_time
            );
            println!("Ingredients:");
            for ingredient in recipe.ingredients.iter() {
                println!("- {ingredient}");
            }
            println!("Steps:");
            for (index, step) in recipe.instructions.iter().enumerate() {
                println!("{}. {step}", index + 1);
            }
            let nutrition = &recipe.nutrition_info;
            println!(
                "Nutrition: {} kcal, {}g protein, {}g carbs, {}g fat",
                nutrition.calories, nutrition.protein, nutrition.carbs, nutrition.fat
            );
        }
        Commands::Subscription { action } => match action {
            SubscriptionCommand::Show { email, json } => {
                let user = db::require_user(&pool, &email).await?;
                let status = current_subscription(&pool, user.user_id).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                    return Ok(());
                }

                let limits = status.effective_tier.plan().limits;
                let since = subscription::usage_period_start(today);
                let plans_used = db::count_meal_plans_since(&pool, user.user_id, since).await?;
                let logs_used = db::count_progress_logs_since(&pool, user.user_id, since).await?;

                println!("Subscription for {email}:");
                println!("- Tier: {}", status.tier.plan().name);
                if status.active {
                    println!("- Status: active");
                } else {
                    println!("- Status: expired, basic limits apply");
                }
                if let Some(expires_at) = status.expires_at {
                    println!(
                        "- Expires: {} ({} days left)",
                        expires_at.date_naive(),
                        status.days_until_expiry
                    );
                }
                println!(
                    "- Meal plans this month: {}",
                    subscription::format_usage(plans_used, limits.meal_plans_per_month)
                );
                println!(
                    "- Progress logs this month: {}",
                    subscription::format_usage(logs_used, limits.progress_logs_per_month)
                );
            }
            SubscriptionCommand::Set {
                email,
                tier,
                months,
            } => {
                let user = db::require_user(&pool, &email).await?;
                let expires_at = subscription::paid_until(Utc::now(), months);
                let stored =
                    db::set_subscription_tier(&pool, user.user_id, tier, Some(expires_at))
                        .await?;

                match stored.expires_at {
                    Some(expires_at) => println!(
                        "{email} is now on {} until {}.",
                        tier.plan().name,
                        expires_at.date_naive()
                    ),
                    None => println!("{email} is now on {}.", tier.plan().name),
                }
            }
            SubscriptionCommand::Plans => {
                for plan in PRICING_PLANS.iter() {
                    let popular = if plan.popular { " (most popular)" } else { "" };
                    println!("{} - ${}/month{}", plan.name, plan.monthly_price, popular);
                    for feature in plan.features.iter() {
                        println!("  - {feature}");
                    }
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("mealplan-progress").chain(args.iter().copied()))
    }

    #[test]
    fn weeks_must_be_within_range() {
        assert!(parse(&["weekly", "--email", "a@b.c", "--weeks", "0"]).is_err());
        assert!(parse(&["report", "--email", "a@b.c", "--weeks", "521"]).is_err());

        let cli = parse(&["weekly", "--email", "a@b.c", "--weeks", "520"]).unwrap();
        assert!(matches!(cli.command, Commands::Weekly { weeks: 520, .. }));

        let cli = parse(&["weekly", "--email", "a@b.c"]).unwrap();
        assert!(matches!(cli.command, Commands::Weekly { weeks: 4, .. }));
    }

    #[test]
    fn subscription_set_parses_tier_and_months() {
        let cli = parse(&["subscription", "set", "--email", "a@b.c", "--tier", "pro"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Subscription {
                action: SubscriptionCommand::Set {
                    tier: SubscriptionTier::Pro,
                    months: 1,
                    ..
                }
            }
        ));
        assert!(parse(&["subscription", "set", "--email", "a@b.c", "--tier", "gold"]).is_err());
        assert!(parse(&["subscription", "plans"]).is_ok());
    }
}
