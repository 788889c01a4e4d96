use anyhow::Result;
use std::env;
use syno_webapi::client::SynoClientBuilder;
use syno_webapi::entities::ApiRequest;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let mut client = SynoClientBuilder::from_env()?
        .service_name("FileStation")
        .build()?;
    client.activate_debug();

    let username = env::var("SYNOLOGY_USERNAME")?;
    let password = env::var("SYNOLOGY_PASSWORD")?;

    let listing = client
        .with_session(&username, &password, Some("cli"), async |client| {
            let info = client.get_available_api().await?;
            println!("available APIs: {}", info.as_object().map_or(0, |apis| apis.len()));

            let folder = env::var("SYNOLOGY_FOLDER").unwrap_or_else(|_| "/home".into());
            client
                .request(
                    ApiRequest::new("FileStation", "List", "entry.cgi", "list")
                        .version(2)
                        .params([("folder_path", folder.as_str()), ("limit", "25")]),
                )
                .await
        })
        .await?;

    println!("listing: {:?}", listing.data());
    Ok(())
}
