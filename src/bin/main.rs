use handyman_booking_agent::{
    catalog::ExpertiseCatalog,
    classifier::KeywordClassifier,
    clock::SystemClock,
    geo::GeoProximityIndex,
    models::{Address, Fare, Provider, ProviderStatus, Requester},
    orchestrator::{Action, BookingDefaults, BookingOrchestrator},
    reply::{BotMessage, Reply},
    session::SessionSlots,
    store::{BookingStore, InMemoryBookingStore},
};
use std::sync::Arc;
use tracing::info;

fn provider(id: &str, name: &str, expertise: &[&str], city: &str, rating: f64) -> Provider {
    Provider {
        id: id.to_string(),
        name: name.to_string(),
        expertise: expertise.iter().map(|e| e.to_string()).collect(),
        status: ProviderStatus::Active,
        rating,
        city: Some(city.to_string()),
        coordinates: None,
        profile_image: None,
    }
}

fn print_reply(turn: &str, reply: &Reply) {
    println!("\n=== {} ===", turn);
    for message in &reply.messages {
        match message {
            BotMessage::Text { text } => println!("{}", text),
            BotMessage::Buttons { text, buttons } => {
                println!("{}", text);
                for button in buttons {
                    println!("  [{}] -> {}", button.title, button.payload);
                }
            }
            BotMessage::ProviderList { cards, problem_type } => {
                println!("({} cards for {})", cards.len(), problem_type);
                for card in cards {
                    println!("  * {} ({}, {}/5)", card.name, card.city, card.rating);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Handyman booking demo starting");

    let store = Arc::new(InMemoryBookingStore::new());
    for p in [
        provider("h1", "Aiman bin Hassan", &["Plumber"], "Klang", 4.5),
        provider("h2", "Kumar Selvam", &["Plumber", "Handyman"], "Klang", 4.9),
        provider("h3", "Lee Wei Ming", &["Plumber - Pipe Repair"], "Shah Alam", 5.0),
        provider("h4", "Farid Osman", &["Electrician"], "Petaling Jaya", 4.8),
    ] {
        store.insert_provider(p).await;
    }
    store.set_fare(Some(Fare { amount: 20.0 })).await;
    store
        .upsert_requester(&Requester {
            id: "demo-user".to_string(),
            name: "Nurul".to_string(),
            primary_address: Some(Address {
                street_name: Some("Jalan Meru".to_string()),
                city: Some("Klang".to_string()),
                ..Default::default()
            }),
            wallet: 50.0,
            created_at: None,
        })
        .await?;

    let orchestrator = BookingOrchestrator::new(
        store.clone(),
        Arc::new(KeywordClassifier),
        Arc::new(ExpertiseCatalog::default()),
        Arc::new(GeoProximityIndex::new(50.0)),
        Arc::new(SystemClock),
        BookingDefaults::default(),
    );

    // Guided flow
    let mut session = SessionSlots::for_requester("demo-user");
    let turns = vec![
        Action::InitializeSession { name: None },
        Action::SuggestProviders {
            intent: "report_issue_plumber".to_string(),
            text: Some("kitchen sink is leaking".to_string()),
        },
        Action::SelectProvider { provider: "Kumar".to_string() },
        Action::CancelRequest,
    ];
    for action in turns {
        let name = action.name();
        let reply = orchestrator.handle(&mut session, action).await;
        print_reply(name, &reply);
    }

    // Single-shot flow
    let mut session = SessionSlots::for_requester("demo-user");
    let reply = orchestrator
        .handle(
            &mut session,
            Action::EasyBook {
                text: "I need a plumber tomorrow at 10am for a leaking pipe, book it".to_string(),
            },
        )
        .await;
    print_reply("easy_book", &reply);

    println!("\n=== STORE ===");
    println!("Reservations: {}", store.reservations().await?.len());
    for fee in store.fee_transactions().await {
        println!("Fee {} RM{} for {}", fee.id, fee.amount, fee.booking_id);
    }

    Ok(())
}
