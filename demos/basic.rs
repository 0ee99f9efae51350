//! Basic example reading a SonarQube platform configuration.
//!
//! Run with:
//! ```
//! SONAR_HOST_URL=https://sonar.acme.com SONAR_TOKEN=your-token cargo run --example basic
//! ```

use sonar_config::{AuditSettings, List, Platform, Portfolio, PortfolioQuery, Project, ProjectQuery};

#[tokio::main]
async fn main() -> sonar_config::Result<()> {
    // Initialize tracing for debugging (optional)
    tracing_subscriber::fmt::init();

    // Create platform from environment variables
    println!("Connecting to SonarQube...");
    let platform = Platform::from_env()?;
    println!(
        "Connected to: {} ({} edition, version {})",
        platform.url(),
        platform.edition().await?,
        platform.version_string(3).await?
    );

    // List first page of projects
    println!("\n--- Listing Projects (first page) ---");
    let page = Project::list_page(&platform, &ProjectQuery::default(), 1, 10).await?;
    println!("Found {} projects (total: {:?})", page.len(), page.total);
    for project in &page.items {
        match project.last_analysis().await? {
            Some(date) => println!("  - {} ({}), analyzed {}", project.key(), project.name(), date),
            None => println!("  - {} ({}), never analyzed", project.key(), project.name()),
        }
    }

    // Portfolios only exist on enterprise editions and above
    if platform.edition().await?.is_enterprise_or_above() {
        println!("\n--- Listing Portfolios ---");
        let portfolios = Portfolio::list_all(&platform, &PortfolioQuery::default()).await?;
        for portfolio in &portfolios {
            println!("  - {} ({} sub-portfolios)", portfolio, portfolio.sub_portfolios().len());
        }
    }

    // Audit the platform with the built-in policy
    println!("\n--- Auditing ---");
    let problems = sonar_config::audit_all(&platform, &AuditSettings::default(), None).await?;
    for problem in problems.iter().take(20) {
        println!("  {}", problem);
    }
    println!("{} problems found", problems.len());

    Ok(())
}
