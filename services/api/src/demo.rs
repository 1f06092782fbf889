use crate::infra::LoggingAlertPublisher;
use clap::Args;
use flowpilot::config::AutomationConfig;
use flowpilot::error::AppError;
use flowpilot::workflows::leads::{
    evaluate, Company, CompanyId, Fixtures, InMemoryLeadRepository, LeadIntakeService,
    LeadSubmission, NewForm, NewQuestion, Principal, QuestionId, QuestionKind, ResourceKind,
    RoutingThresholds, RuleSet, ScoringRule, StepOutcome, WebhookError, WebhookPayload,
    WebhookPublisher,
};
use std::sync::{Arc, Mutex};

const DEMO_TENANT: &str = "demo-movers";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Subscription plan of the seeded tenant (starter, pro, enterprise)
    #[arg(long, default_value = "pro")]
    pub(crate) plan: String,
    /// Print the webhook payloads that would be posted
    #[arg(long)]
    pub(crate) show_payloads: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Rule set as JSON, e.g. '{"q1":{"type":"contains","value":"urgent","points":50}}'
    #[arg(long)]
    pub(crate) rules: String,
    /// Answers as JSON, e.g. '{"q1":"This is an urgent request"}'
    #[arg(long)]
    pub(crate) answers: String,
}

#[derive(Default)]
struct CapturedWebhooks {
    payloads: Mutex<Vec<(String, WebhookPayload)>>,
}

impl WebhookPublisher for CapturedWebhooks {
    fn publish(&self, url: &str, payload: WebhookPayload) -> Result<(), WebhookError> {
        self.payloads
            .lock()
            .expect("webhook mutex poisoned")
            .push((url.to_string(), payload));
        Ok(())
    }
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let rules: RuleSet = serde_json::from_str(&args.rules)?;
    let answers = serde_json::from_str(&args.answers)?;

    let result = evaluate(&rules, &answers);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn demo_company(plan: &str) -> Company {
    Company {
        id: CompanyId::from(DEMO_TENANT),
        name: "Demo Movers".to_string(),
        plan: Some(plan.to_string()),
        owner_email: Some("owner@demo-movers.test".to_string()),
        webhook_url: Some("https://crm.demo-movers.test/hooks/lead".to_string()),
    }
}

fn demo_form() -> NewForm {
    NewForm {
        name: "Moving quote".to_string(),
        description: Some("Tell us about your move".to_string()),
        questions: vec![
            NewQuestion {
                id: Some(QuestionId::from("q1")),
                label: "What do you need help with?".to_string(),
                kind: QuestionKind::LongText,
                required: true,
                options: Vec::new(),
            },
            NewQuestion {
                id: Some(QuestionId::from("name")),
                label: "Your name".to_string(),
                kind: QuestionKind::ShortText,
                required: false,
                options: Vec::new(),
            },
        ],
    }
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Completed => "completed".to_string(),
        StepOutcome::Skipped(reason) => format!("skipped ({reason})"),
        StepOutcome::Failed(reason) => format!("failed ({reason})"),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        plan,
        show_payloads,
    } = args;

    let repository = Arc::new(InMemoryLeadRepository::from_fixtures(Fixtures {
        companies: vec![demo_company(&plan)],
        ..Fixtures::default()
    }));
    let alerts = Arc::new(LoggingAlertPublisher::default());
    let webhooks = Arc::new(CapturedWebhooks::default());
    let service = LeadIntakeService::new(
        repository,
        alerts.clone(),
        webhooks.clone(),
        AutomationConfig::default(),
    );
    let owner = Principal::for_company(DEMO_TENANT);

    println!("FlowPilot lead intake demo");
    let form = service.create_form(&owner, demo_form())?;
    let mut rules = RuleSet::new();
    rules.insert(QuestionId::from("q1"), ScoringRule::contains("urgent", 50));
    let form = service.replace_rules(&owner, &form.id, rules)?;
    let form = service.update_routing(&owner, &form.id, RoutingThresholds::new(40, 70))?;
    println!(
        "- Form '{}' ({}) on plan {} | reject below {} | accept above {}",
        form.name,
        form.slug,
        plan,
        form.routing.minimum_score,
        form.routing.high_value_score
    );

    let prospects = [
        ("Kari Nordmann", "This is an urgent request"),
        ("Ola Hansen", "just curious"),
    ];

    println!("\nSubmissions");
    for (name, need) in prospects {
        let submission = LeadSubmission {
            answers: [
                (QuestionId::from("q1"), serde_json::json!(need)),
                (QuestionId::from("name"), serde_json::json!(name)),
            ]
            .into_iter()
            .collect(),
            ..LeadSubmission::default()
        };

        let receipt = match service.ingest(&form.id, submission) {
            Ok(receipt) => receipt,
            Err(err) => {
                println!("  - \"{}\" rejected: {}", need, err);
                continue;
            }
        };

        let Some(report) = receipt.automation.finished().await else {
            println!("  - \"{}\" automation aborted", need);
            continue;
        };
        println!(
            "  - \"{}\" -> score {} ({:?}) | status {} | assignee {} | alert {} | webhook {}",
            need,
            receipt.score.score,
            receipt.score.band,
            receipt.status.label(),
            report.assignment.assignee.as_deref().unwrap_or("unassigned"),
            describe(&report.alert),
            describe(&report.webhook),
        );
    }

    let usage = service.check_limit(&owner, ResourceKind::Leads)?;
    println!(
        "\nQuota: {} of {} leads used on {:?} plan",
        usage.current, usage.limit, usage.plan
    );
    println!("Owner alerts dispatched: {}", alerts.events().len());

    if show_payloads {
        let payloads = webhooks.payloads.lock().expect("webhook mutex poisoned");
        println!("\nWebhook payloads");
        for (url, payload) in payloads.iter() {
            println!("  POST {url}");
            println!("{}", serde_json::to_string_pretty(payload)?);
        }
    }

    println!("\nExport\n{}", service.export_leads(&owner)?);
    Ok(())
}
