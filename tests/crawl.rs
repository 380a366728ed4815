use board_game_scraper::sources::{BgaSpider, LudingSpider};
use board_game_scraper::testing::MockFetcher;
use board_game_scraper::{BgaConfig, ChainMode, CrawlConfig, FieldValue, Record, Runner};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const SEARCH: &str = "http://bga.test/api/search?limit=100&order-by=popularity&skip=0";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bga_spider() -> BgaSpider {
    BgaSpider::new(BgaConfig {
        api_url: "http://bga.test/api".to_string(),
        ..BgaConfig::default()
            .with_stages(true, true, false)
            .with_expected(100, 0)
    })
}

fn bga_fetcher() -> MockFetcher {
    MockFetcher::new()
        .with_json(
            SEARCH,
            &json!({"games": [
                {"id": "G1", "name": "Catan", "image_url": "https://img/catan.jpg"},
                {"id": "G2", "name": "Azul"},
                {"id": "G3"}
            ]}),
        )
        .with_json(
            "http://bga.test/api/game/images?game-id=G1&limit=100",
            &json!({"images": [{"url": "https://img/catan-2.jpg"}]}),
        )
        .with_status("http://bga.test/api/game/videos?game-id=G1&limit=100", 503)
        .with_json(
            "http://bga.test/api/game/videos?game-id=G2&limit=100",
            &json!({"videos": [{"url": "https://yt/azul"}]}),
        )
}

fn by_name(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by_key(|r| r.get("name").map(FieldValue::to_text));
    records
}

#[tokio::test]
async fn bga_chains_survive_failed_stages() {
    init_tracing();
    let fetcher = bga_fetcher();
    let report = Runner::new(fetcher.clone(), CrawlConfig::default())
        .run(&bga_spider())
        .await;

    assert_eq!(report.drops.len(), 1);
    assert_eq!(report.drops[0].url, SEARCH);

    let records = by_name(report.records);
    assert_eq!(records.len(), 2);
    let (azul, catan) = (&records[0], &records[1]);

    assert_eq!(
        catan.get("image_url"),
        Some(&FieldValue::from(vec!["https://img/catan.jpg", "https://img/catan-2.jpg"]))
    );
    assert!(!catan.contains("video_url"));
    assert_eq!(azul.get("video_url"), Some(&FieldValue::from(vec!["https://yt/azul"])));
    assert!(!azul.contains("image_url"));

    let line = catan.to_json_line().unwrap();
    assert!(line.starts_with(r#"{"name":"Catan""#));
    assert!(line.contains(r#""bga_id":"G1""#));

    let calls = fetcher.calls();
    let position = |url: &str| calls.iter().position(|c| c == url).unwrap();
    assert!(
        position("http://bga.test/api/game/images?game-id=G1&limit=100")
            < position("http://bga.test/api/game/videos?game-id=G1&limit=100")
    );
}

#[tokio::test]
async fn bga_fan_out_yields_the_same_records() {
    init_tracing();
    let run = |mode| async move {
        let config = CrawlConfig::default().with_chain_mode(mode);
        let report = Runner::new(bga_fetcher(), config).run(&bga_spider()).await;
        by_name(report.records)
            .into_iter()
            .map(|mut r| {
                r.unset("scraped_at");
                r
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(ChainMode::Sequential).await, run(ChainMode::FanOut).await);
}

#[tokio::test]
async fn luding_letter_to_game() {
    init_tracing();
    let fetcher = MockFetcher::new()
        .with_body(
            "http://luding.org/cgi-bin/GameFirstLetter.py?letter=A",
            r#"<table class="game-list">
                <tr><td><a href="GameData.py?gameid=7">Acquire</a></td></tr>
                <tr><td><a href="GameData.py?gameid=8">Missing</a></td></tr>
            </table>"#,
        )
        .with_body(
            "http://luding.org/cgi-bin/GameData.py?gameid=7",
            r#"<h1>Acquire</h1><table>
                <tr><td>Year:</td><td>1962</td></tr>
                <tr><td>Designer:</td><td><a href="/p/1">Sid Sackson</a></td></tr>
            </table>"#,
        );

    let report = Runner::new(fetcher, CrawlConfig::default().with_concurrency(2))
        .run(&LudingSpider::new())
        .await;

    assert_eq!(report.records.len(), 1);
    let acquire = &report.records[0];
    assert_eq!(acquire.get("name"), Some(&FieldValue::from("Acquire")));
    assert_eq!(acquire.get("year"), Some(&FieldValue::Int(1962)));
    assert_eq!(acquire.get("luding_id"), Some(&FieldValue::Int(7)));
    assert_eq!(acquire.get("designer"), Some(&FieldValue::from(vec!["Sid Sackson"])));

    // 26 letter pages without fixtures plus the game page that 404s
    assert_eq!(report.drops.len(), 27);
}
