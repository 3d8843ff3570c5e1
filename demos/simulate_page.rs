//! Page Load Simulation Example
//!
//! Records a small synthetic page load (document, stylesheet, two scripts,
//! an image and a few main-thread tasks) and estimates its load metrics on a
//! throttled mobile connection.
//!
//! The example showcases:
//! - Building artifacts from trace events and network records
//! - Computing every metric through one cached analysis run
//! - Inspecting optimistic vs pessimistic estimates
//! - Run statistics
//!
//! Run with: `RUST_LOG=lantern=debug cargo run --example simulate_page`

use lantern::config::{AnalysisConfig, AnalysisConfigBuilder};
use lantern::network::{NetworkLog, NetworkRecord, ResourcePriority, ResourceType};
use lantern::{AnalysisRun, PageArtifacts, Result, Trace, TraceEvent};

// ============================================================================
// Page Recording
// ============================================================================

const ORIGIN: &str = "https://shop.example";
const NAVIGATION_START_US: f64 = 1_000_000.0;

/// Network clock, seconds.
fn secs(ms: f64) -> f64 {
    (NAVIGATION_START_US / 1000.0 + ms) / 1000.0
}

/// Trace clock, µs.
fn micros(ms: f64) -> f64 {
    NAVIGATION_START_US + ms * 1000.0
}

fn resource(
    id: &str,
    path: &str,
    kind: ResourceType,
    priority: ResourcePriority,
    span: (f64, f64),
    bytes: u64,
) -> NetworkRecord {
    NetworkRecord::new(id, format!("{}{}", ORIGIN, path), secs(span.0), secs(span.1))
        .with_type(kind)
        .with_priority(priority)
        .with_connection(id)
        .with_transfer_size(bytes)
        .initiated_by_parser(format!("{}/", ORIGIN))
}

fn task(start: f64, duration: f64, child: &str, data: serde_json::Value) -> Vec<TraceEvent> {
    vec![
        TraceEvent::complete("RunTask", micros(start), duration * 1000.0),
        TraceEvent::complete(child, micros(start), duration * 1000.0).with_data(data),
    ]
}

fn record_page() -> PageArtifacts {
    let records = vec![
        NetworkRecord::new("1", format!("{}/", ORIGIN), secs(0.0), secs(350.0))
            .with_type(ResourceType::Document)
            .with_priority(ResourcePriority::VeryHigh)
            .with_connection("1")
            .with_transfer_size(24_000),
        resource(
            "2",
            "/site.css",
            ResourceType::Stylesheet,
            ResourcePriority::VeryHigh,
            (360.0, 520.0),
            18_000,
        ),
        resource(
            "3",
            "/framework.js",
            ResourceType::Script,
            ResourcePriority::High,
            (365.0, 800.0),
            140_000,
        ),
        resource(
            "4",
            "/checkout.js",
            ResourceType::Script,
            ResourcePriority::High,
            (370.0, 700.0),
            45_000,
        ),
        resource(
            "5",
            "/banner.webp",
            ResourceType::Image,
            ResourcePriority::Low,
            (380.0, 1200.0),
            160_000,
        ),
    ];

    let mut events = vec![
        TraceEvent::instant("TracingStartedInPage", micros(0.0)),
        TraceEvent::instant("navigationStart", micros(0.0)),
    ];
    events.extend(task(355.0, 30.0, "ParseHTML", serde_json::json!({})));
    let framework = format!("{}/framework.js", ORIGIN);
    let checkout = format!("{}/checkout.js", ORIGIN);
    events.extend(task(810.0, 180.0, "EvaluateScript", serde_json::json!({ "url": framework })));
    events.extend(task(995.0, 90.0, "EvaluateScript", serde_json::json!({ "url": checkout })));
    events.extend(task(1090.0, 40.0, "Layout", serde_json::json!({})));
    events.push(TraceEvent::instant("firstMeaningfulPaint", micros(1150.0)));
    events.extend(task(1400.0, 250.0, "FunctionCall", serde_json::json!({ "url": checkout })));

    PageArtifacts::new(Trace::new(events), NetworkLog::new(records))
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    lantern::init_logging("info");

    // Slow 4G with a mid-tier phone
    let config: AnalysisConfig = AnalysisConfigBuilder::new()
        .rtt_ms(150.0)
        .throughput_kbps(1638.4)
        .cpu_slowdown_multiplier(4.0)
        .build()?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           Page Load Simulation Example                   ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Throttling:                                              ║");
    println!("║   RTT:              {:>8.1} ms", config.throttling.rtt_ms);
    println!("║   Throughput:       {:>8.1} Kbps", config.throttling.throughput_kbps);
    println!("║   CPU Slowdown:     {:>8.1}x", config.throttling.cpu_slowdown_multiplier);
    println!(
        "║   Connections:      {:>8} per origin",
        config.throttling.max_connections_per_origin
    );
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let page = record_page();
    let run = AnalysisRun::new(config).with_name("simulate_page");

    let graph = run.page_graph(&page)?;
    println!(
        "Dependency graph: {} nodes ({} requests, {} tasks)",
        graph.len(),
        graph.network_nodes().count(),
        graph.cpu_nodes().count()
    );
    println!();

    let results = run.compute_all(&page)?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                   Estimated Metrics                      ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    for (id, result) in &results {
        println!("║ {}", id);
        println!("║   Blended:          {:>8.1} ms", result.timing);
        println!(
            "║   Optimistic:       {:>8.1} ms ({} nodes)",
            result.optimistic_estimate.time_in_ms,
            result.optimistic_graph.len()
        );
        println!(
            "║   Pessimistic:      {:>8.1} ms ({} nodes)",
            result.pessimistic_estimate.time_in_ms,
            result.pessimistic_graph.len()
        );
    }
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let stats = run.finish();
    println!("{}", stats.summary());

    Ok(())
}
