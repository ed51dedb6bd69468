use evmauth_core::{
    AgentId, AgentLedger, AgentStatus, AgentType, LedgerEvent, NewAgent, PaymentRequest,
    PaymentStatus,
};
use evmauth_sim::{SimulationAdapter, SimulationConfig, DEMO_OWNER};
use evmauth_test_utils::{amount, other_owner, recipient};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn config() -> SimulationConfig {
    SimulationConfig::default()
        .with_synthesis_interval(None)
        .with_seed(42)
}

#[tokio::test(start_paused = true)]
async fn test_creation_scenario() {
    let sim = SimulationAdapter::start(config()).unwrap();
    let handle = sim
        .create_agent(NewAgent {
            name: "Alpha Trader".into(),
            agent_type: AgentType::Trading,
            max_daily_spend: amount("0.5"),
        })
        .await
        .unwrap();

    let agent = sim.get_agent(AgentId(1)).await.unwrap();
    assert_eq!(agent.did.as_str(), format!("did:ethr:{}", DEMO_OWNER.to_checksum(None)));
    assert_eq!(agent.max_daily_spend.to_string(), "0.5");
    assert_eq!(agent.status, AgentStatus::Pending);

    let confirmation = sim
        .await_confirmation(&handle, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(confirmation.is_confirmed());
    assert_eq!(sim.get_agent(AgentId(1)).await.unwrap().status, AgentStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_budget_scenario_is_enforced_locally() {
    let sim = SimulationAdapter::start(config()).unwrap();
    sim.create_agent(NewAgent {
        name: "Alpha Trader".into(),
        agent_type: AgentType::Trading,
        max_daily_spend: amount("0.5"),
    })
    .await
    .unwrap();
    sim.activate_agent(AgentId(1)).await.unwrap();

    let pay = |value: &str| PaymentRequest {
        agent_id: AgentId(1),
        recipient: recipient(),
        amount: amount(value),
        memo: None,
    };
    sim.authorize_payment(pay("0.45")).await.unwrap();
    let err = sim.authorize_payment(pay("0.10")).await.unwrap_err();
    assert_eq!(err.kind(), "rejected");
    let handle = sim.authorize_payment(pay("0.05")).await.unwrap();

    let confirmation = sim
        .await_confirmation(&handle, Duration::from_secs(6))
        .await
        .unwrap();
    assert!(confirmation.is_confirmed());
    assert!(matches!(
        confirmation.events.last(),
        Some(LedgerEvent::PaymentSettled { .. })
    ));
    assert_eq!(sim.remaining_daily_budget(AgentId(1)).await.unwrap(), amount("0"));
}

#[tokio::test(start_paused = true)]
async fn test_pending_agent_cannot_originate_payments() {
    let sim = SimulationAdapter::start(config()).unwrap();
    sim.create_agent(NewAgent {
        name: "Content Bot".into(),
        agent_type: AgentType::Content,
        max_daily_spend: amount("0.1"),
    })
    .await
    .unwrap();

    let err = sim
        .authorize_payment(PaymentRequest {
            agent_id: AgentId(1),
            recipient: recipient(),
            amount: amount("0.01"),
            memo: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "rejected");
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_keeps_bounded_history() {
    let sim = SimulationAdapter::start(
        config()
            .with_demo_data(true)
            .with_history_limit(5)
            .with_synthesis_interval(Some(Duration::from_secs(10))),
    )
    .unwrap();
    assert_eq!(sim.store().payment_count(), 3);

    tokio::time::sleep(Duration::from_secs(200)).await;
    let ids = sim.list_user_payment_ids(DEMO_OWNER).await.unwrap();
    assert!(ids.len() <= 5);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    for id in ids {
        let payment = sim.get_payment(id).await.unwrap();
        assert!(payment.amount <= amount("0.11"));
        assert_ne!(payment.status, PaymentStatus::Failed);
    }
}

#[tokio::test(start_paused = true)]
async fn test_synthesized_payments_settle_after_delay() {
    let sim = SimulationAdapter::start(config().with_demo_data(true)).unwrap();
    let id = sim.synthesize_payment().unwrap();
    assert_eq!(sim.get_payment(id).await.unwrap().status, PaymentStatus::Pending);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(sim.get_payment(id).await.unwrap().status, PaymentStatus::Settled);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_timer() {
    let sim = SimulationAdapter::start(config().with_demo_data(true)).unwrap();
    let handle = sim
        .create_agent(NewAgent {
            name: "DeFi Master".into(),
            agent_type: AgentType::Defi,
            max_daily_spend: amount("1"),
        })
        .await
        .unwrap();
    let payment = sim.synthesize_payment().unwrap();

    sim.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(sim.get_agent(AgentId(4)).await.unwrap().status, AgentStatus::Pending);
    assert_eq!(sim.get_payment(payment).await.unwrap().status, PaymentStatus::Pending);
    let err = sim
        .await_confirmation(&handle, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unavailable");
    assert!(sim.synthesize_payment().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sessions_do_not_share_records() {
    let first = SimulationAdapter::start(config().with_demo_data(true)).unwrap();
    let second = SimulationAdapter::start(config().with_owner(other_owner())).unwrap();

    assert_eq!(first.list_user_agent_ids(DEMO_OWNER).await.unwrap().len(), 3);
    assert!(second.list_user_agent_ids(DEMO_OWNER).await.unwrap().is_empty());
    assert!(second.get_agent(AgentId(1)).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_wait_times_out_without_side_effects() {
    let sim = SimulationAdapter::start(config()).unwrap();
    let handle = sim
        .create_agent(NewAgent {
            name: "Market Analyzer".into(),
            agent_type: AgentType::Analytics,
            max_daily_spend: amount("0.2"),
        })
        .await
        .unwrap();

    let err = sim
        .await_confirmation(&handle, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sim.get_agent(AgentId(1)).await.unwrap().status, AgentStatus::Active);
}
