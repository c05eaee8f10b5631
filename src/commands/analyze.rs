//! Handlers for `lumos analyze income|expense|dashboard`.

use crate::args::PeriodArgs;
use crate::commands::{month, plural, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{CurrencyFormat, Month};
use crate::service::{self, Analysis, AnalysisFilter, Dashboard};
use crate::{Config, Result};

pub async fn analyze_income(config: Config, args: PeriodArgs) -> Result<Out<Analysis>> {
    let filter = filter(&config, &args)?;
    let analysis = service::income_analysis(config.db(), &filter)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        describe("Income", config.currency(), &analysis),
        analysis,
    ))
}

pub async fn analyze_expense(config: Config, args: PeriodArgs) -> Result<Out<Analysis>> {
    let filter = filter(&config, &args)?;
    let analysis = service::expense_analysis(config.db(), &filter)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        describe("Expenses", config.currency(), &analysis),
        analysis,
    ))
}

pub async fn dashboard(config: Config) -> Result<Out<Dashboard>> {
    let dashboard = service::dashboard(config.db(), config.owner())
        .await
        .pub_result(ErrorType::Database)?;
    let currency = config.currency();
    let mut message = format!(
        "{} documents, {} active sources. Last {} months: income {}, expenses {}, net {}",
        dashboard.total_documents,
        dashboard.active_sources.len(),
        dashboard.recent_documents.len(),
        currency.display(dashboard.total_income),
        currency.display(dashboard.total_expenses),
        currency.display(dashboard.net_income),
    );
    for document in &dashboard.recent_documents {
        message.push_str(&format!(
            "\n  {} {}: income {}, expenses {}, net {}",
            document.month_name(),
            document.year(),
            currency.display(document.summary().total_income()),
            currency.display(document.summary().total_expenses()),
            currency.display(document.net_income()),
        ));
    }
    Ok(Out::new(message, dashboard))
}

fn filter(config: &Config, args: &PeriodArgs) -> Result<AnalysisFilter> {
    let month = args.month().map(month).transpose()?;
    Ok(AnalysisFilter::new(config.owner(), args.year(), month))
}

fn describe(label: &str, currency: &CurrencyFormat, analysis: &Analysis) -> String {
    let mut message = format!(
        "{label}{}: {} over {} document{}, {} per document",
        period(analysis),
        currency.display(analysis.total),
        analysis.document_count,
        plural(analysis.document_count as usize),
        currency.display(analysis.average),
    );
    for c in &analysis.categories {
        message.push_str(&format!(
            "\n  {:<20} {:>16} ({} row{}, average {})",
            c.category,
            currency.display(c.total),
            c.count,
            plural(c.count as usize),
            currency.display(c.average),
        ));
    }
    message
}

/// ` in August 2025`, ` in 2025` or nothing, from the documents' common period.
fn period(analysis: &Analysis) -> String {
    let mut years: Vec<i32> = analysis.documents.iter().map(|d| d.year()).collect();
    years.dedup();
    let mut months: Vec<Month> = analysis.documents.iter().map(|d| d.month()).collect();
    months.dedup();
    match (years.as_slice(), months.as_slice()) {
        ([year], [month]) => format!(" in {month} {year}"),
        ([year], _) => format!(" in {year}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::SyncArgs;
    use crate::commands::sync;
    use crate::error::error_type;
    use crate::model::Amount;
    use crate::test::TestEnv;
    use crate::Mode;
    use std::str::FromStr;

    async fn synced_env() -> TestEnv {
        let env = TestEnv::new().await;
        env.add_source("Main", "seeded-analyze").await;
        sync(env.config(), Mode::Testing, SyncArgs::default())
            .await
            .unwrap();
        env
    }

    #[tokio::test]
    async fn test_analyze_expense_for_a_month() {
        let env = synced_env().await;
        let out = analyze_expense(env.config(), PeriodArgs::new(Some(2025), Some(8)))
            .await
            .unwrap();
        let analysis = out.structure().unwrap();
        assert_eq!(analysis.total, Amount::from_str("188700").unwrap());
        assert!(out.message().starts_with("Expenses in August 2025: Rp188.700"));
        assert_eq!(analysis.categories[0].category, "Food");
    }

    #[tokio::test]
    async fn test_analyze_income_all_time() {
        let env = synced_env().await;
        let out = analyze_income(env.config(), PeriodArgs::default())
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().document_count, 3);
        assert!(out.message().starts_with("Income in 2025: Rp15.650.000"));
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_month() {
        let env = TestEnv::new().await;
        let err = analyze_income(env.config(), PeriodArgs::new(None, Some(0)))
            .await
            .unwrap_err();
        assert_eq!(error_type(&err), Some(ErrorType::Request));
    }

    #[tokio::test]
    async fn test_dashboard() {
        let env = synced_env().await;
        let out = dashboard(env.config()).await.unwrap();
        let dashboard = out.structure().unwrap();
        assert_eq!(dashboard.recent_documents.len(), 3);
        assert!(out.message().contains("August 2025: income Rp5.250.000"));
    }
}
