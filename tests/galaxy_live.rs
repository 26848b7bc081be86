use galaxy_pipeline::config::{API_KEY_ENV, DEFAULT_GALAXY_URL};
use galaxy_pipeline::galaxy::{GalaxyClient, GalaxyHttpClient};

#[test]
#[ignore]
fn lists_histories_on_a_real_server() {
    let api_key = std::env::var(API_KEY_ENV).unwrap();
    let url = std::env::var("GALAXY_URL").unwrap_or_else(|_| DEFAULT_GALAXY_URL.to_string());
    let client = GalaxyHttpClient::new(&url, &api_key).unwrap();

    let histories = client.find_histories("galaxy-pipeline-smoke-test").unwrap();

    assert!(
        histories
            .iter()
            .all(|history| history.name == "galaxy-pipeline-smoke-test")
    );
}
