use anyhow::Result;
use bank::{models::RankingKind, ranking::previous_month};
use chrono::Utc;
use clap::{Parser, Subcommand};
use server::{config::Config, state::State};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the admin account, core subjects and free tests.
    Seed {
        #[arg(long, default_value = "+996555000000")]
        admin_phone: String,

        #[arg(long, default_value = "admin123")]
        admin_password: String,
    },

    /// Compute the monthly ranking, defaulting to last month.
    Rank {
        #[arg(long)]
        month: Option<u32>,

        #[arg(long)]
        year: Option<i32>,

        /// school, region or country
        #[arg(long = "type", default_value = "country")]
        kind: RankingKind,
    },

    ResetPassword {
        #[arg(long)]
        phone: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        make_admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let state = State::new(Config::load()?).await?;

    match args.command {
        Command::Seed {
            admin_phone,
            admin_password,
        } => {
            let report = process::seed(&state, &admin_phone, &admin_password).await?;
            println!("Subjects created: {}", report.subjects_created);
            println!("Tests created: {}", report.tests_created);
            println!("Questions created: {}", report.questions_created);
        }
        Command::Rank { month, year, kind } => {
            let (default_month, default_year) = previous_month(Utc::now());
            let month = month.unwrap_or(default_month);
            let year = year.unwrap_or(default_year);

            let outcome = process::rank(state.store.as_ref(), month, year, kind).await?;
            println!("Rankings: {}", outcome.rankings_count);
            match outcome.first_place {
                Some(first) => println!(
                    "First place: {} ({:.1}), bonus awarded: {}",
                    first.user_id, first.avg_score, first.bonus_awarded
                ),
                None => println!("No results for {month:02}/{year}"),
            }
        }
        Command::ResetPassword {
            phone,
            password,
            make_admin,
        } => {
            let user = process::reset_password(&state, &phone, &password, make_admin).await?;
            info!("Updated {} ({})", user.phone, user.role);
        }
    }

    Ok(())
}
