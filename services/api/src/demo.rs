use crate::infra::{parse_service_code, HeuristicAnalyzer, LoggingNotifier};
use chrono::{Duration, Utc};
use clap::Args;
use spi_flow::config::AppConfig;
use spi_flow::error::AppError;
use spi_flow::workflows::cases::{
    CaseService, ClosingQuote, DocumentStatus, FileRef, ManualClock, MemoryCaseStore, NewCase,
    PaymentKind, Principal, ReviewDecision, Role, ServiceCode, TimePolicy,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// Base amount of the service order
    #[arg(long, default_value_t = 500_000)]
    pub(crate) amount_base: u64,
    /// Days elapsed since the case was opened
    #[arg(long, default_value_t = 0)]
    pub(crate) days_elapsed: i64,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Service code to open (RM, RMBUSQ, BUSQ, CONTA, PREC, RTAO, RENM, OPORM, AFEC, REG_SAN)
    #[arg(long, default_value = "RM", value_parser = parse_service_code)]
    pub(crate) service: ServiceCode,
    /// Base amount of the service order
    #[arg(long, default_value_t = 500_000)]
    pub(crate) amount_base: u64,
    /// Day of the deadline window on which the closing payment arrives
    #[arg(long, default_value_t = 10)]
    pub(crate) closing_day: i64,
    /// Upload a blurry first copy of the first document to show automated rejection
    #[arg(long)]
    pub(crate) blurry_upload: bool,
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let time = TimePolicy::new(config.engine.pricing);

    let opened = Utc::now();
    let deadline = time.deadline_for(opened);
    let quote = time.closing_quote(
        args.amount_base,
        opened + Duration::days(args.days_elapsed),
        deadline,
    );

    println!(
        "Closing quote after {} of {} days",
        args.days_elapsed,
        time.policy().deadline_window_days
    );
    render_quote(&quote);
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(LoggingNotifier::default());
    let service = CaseService::new(
        Arc::new(MemoryCaseStore::default()),
        notifier.clone(),
        Arc::new(HeuristicAnalyzer::default()),
        config.engine,
    )
    .with_clock(clock.clone());

    let client = Principal::new("demo-client", Role::Client, Some("demo-company"));
    let staff = Principal::new("spi-demo", Role::SpiAdmin, None);

    println!("SPI service order demo");
    let detail = service.open_case(
        &client,
        NewCase {
            client_id: client.id.clone(),
            company_id: None,
            title: format!("{} (demo)", args.service.label()),
            service_code: args.service,
            amount_base: args.amount_base,
        },
    )?;
    let case_id = detail.case.id.clone();
    println!(
        "Opened {} | {} | area {} | deadline {}",
        case_id,
        detail.case.service_code.label(),
        detail.case.area.label(),
        detail.case.deadline.format("%Y-%m-%d")
    );
    for document in &detail.documents {
        println!("  - {} [{}]", document.name, document.kind.label());
    }

    service.advance(&client, &case_id)?;
    service.confirm_payment(&case_id, PaymentKind::Advance)?;
    let view = service.advance(&client, &case_id)?;
    println!("\nStage: {}", view.stage_label);

    for (index, document) in detail.documents.iter().enumerate() {
        let first_upload = if args.blurry_upload && index == 0 {
            format!("blob://demo/{}-blur.jpg", document.document_type)
        } else {
            format!("blob://demo/{}.pdf", document.document_type)
        };
        service.submit_document(&client, &document.id, FileRef(first_upload))?;

        let mut outcome = service
            .request_automated_analysis(&client, &document.id)
            .await?;
        println!(
            "  {} -> {} ({:.0}% confidence)",
            document.name,
            outcome.document.status.label(),
            outcome.confidence * 100.0
        );

        if outcome.document.status == DocumentStatus::Rejected {
            if let Some(reason) = &outcome.document.rejection_reason {
                println!("    reason: {reason}");
            }
            let clean = format!("blob://demo/{}.pdf", document.document_type);
            service.submit_document(&client, &document.id, FileRef(clean))?;
            outcome = service
                .request_automated_analysis(&client, &document.id)
                .await?;
            if outcome.document.status != DocumentStatus::Validated {
                service.review_document(&staff, &document.id, ReviewDecision::Approve, None)?;
            }
            println!("    resubmitted -> validated");
        }
    }

    let view = service.advance(&client, &case_id)?;
    println!("\nStage: {}", view.stage_label);

    clock.advance(Duration::days(args.closing_day));
    service.confirm_payment(&case_id, PaymentKind::Closing)?;
    let quote = service.compute_closing_amount(&client, &case_id)?;
    println!("Closing payment confirmed on day {}", args.closing_day);
    render_quote(&quote);

    let view = service.advance(&client, &case_id)?;
    println!("\nStage: {}", view.stage_label);

    println!("\nAudit log");
    for event in service.audit_log(&client, &case_id)? {
        println!(
            "  {} [{}] {}",
            event.timestamp.format("%Y-%m-%d %H:%M"),
            event.actor_id,
            event.text
        );
    }

    let vault = service.vault_entries(&client, &client.id)?;
    if vault.is_empty() {
        println!("\nVault: no reusable documents");
    } else {
        println!("\nVault");
        for entry in vault {
            let expiry = entry
                .days_to_expiry
                .map(|days| format!("{days} days left"))
                .unwrap_or_else(|| "no expiry".to_string());
            println!("  - {} ({expiry})", entry.name);
        }
    }

    println!("\nNotifications dispatched: {}", notifier.delivered());
    Ok(())
}

fn render_quote(quote: &ClosingQuote) {
    println!("  Base:       {}", quote.base);
    if quote.discount > 0 {
        println!("  Discount:  -{}", quote.discount);
    }
    if quote.surcharge > 0 {
        println!("  Surcharge: +{}", quote.surcharge);
    }
    println!("  Total:      {} ({})", quote.total, quote.adjustment.label());
    println!("  Days left:  {}", quote.days_left);
}
