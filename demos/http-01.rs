use std::{fs, path::Path, sync::Arc};

use acme_client::{
    AcmeClient, ClientConfig, CsrSubject, Directory, DirectoryUrl, KeyPair, ReqwestSender,
    DEFAULT_TIMEOUT,
};
use actix_files::Files;
use actix_web::{App, HttpServer};

const PRIMARY_NAME: &str = "example.org";
const CONTACT_EMAIL: &str = "foo@bar.com";

const ACCOUNT_PUBLIC_KEY: &str = "account.pub";
const ACCOUNT_PRIVATE_KEY: &str = "account.key";

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Use `DirectoryUrl::LetsEncrypt` for production uses.
    let url = DirectoryUrl::LetsEncryptStaging;

    fs::create_dir_all("acme-challenge")?;

    // Create temporary Actix Web server for ACME challenge.
    let srv = HttpServer::new(|| {
        App::new().service(
            Files::new("/.well-known/acme-challenge", "acme-challenge").show_files_listing(),
        )
    })
    .bind(("0.0.0.0", 80))?
    .shutdown_timeout(0)
    .run();

    let srv_handle = srv.handle();
    let srv_task = actix_web::rt::spawn(srv);

    // Fetch the directory; this also captures the first replay-nonce.
    let sender = Arc::new(ReqwestSender::new(ReqwestSender::DEFAULT_TIMEOUT)?);
    let directory = Directory::fetch(&sender, url).await?;

    // Reuse the account key across runs: registering the same key twice is refused by the CA.
    let (account_key, is_new) = if Path::new(ACCOUNT_PRIVATE_KEY).exists() {
        (KeyPair::load(ACCOUNT_PUBLIC_KEY, ACCOUNT_PRIVATE_KEY)?, false)
    } else {
        let key = KeyPair::generate()?;
        fs::write(ACCOUNT_PUBLIC_KEY, key.public_key_pem()?)?;
        fs::write(ACCOUNT_PRIVATE_KEY, key.private_key_pem()?.as_bytes())?;
        (key, true)
    };

    let client = AcmeClient::new(sender, directory, ClientConfig::lets_encrypt())
        .with_account_key_pair(account_key);

    if is_new {
        let account = client.register_account(None, Some(CONTACT_EMAIL)).await?;
        println!("registered account {:?}", account.location());
    }

    // For HTTP, the challenge is a text file that needs to
    // be placed in your web server's root:
    //
    // /<root>/.well-known/acme-challenge/<token>
    //
    // The important thing is that it's accessible over the
    // web for the domain you are trying to get a
    // certificate for:
    //
    // http://example.org/.well-known/acme-challenge/<token>
    let challenge = client.request_challenge(PRIMARY_NAME).await?;

    // The token is the filename, the key authorization its content.
    let path = format!("acme-challenge/{}", challenge.token());
    fs::write(path, challenge.payload())?;

    // After the file is accessible from the web, this tells the
    // ACME API to start checking it and waits for the result.
    client.check_challenge(&challenge, DEFAULT_TIMEOUT).await?;

    // Ownership is proven. Create a key pair for the certificate.
    // You can provide your own key pair instead if you want.
    let domain_key = KeyPair::generate()?;
    let subject = CsrSubject::new("FR", "", "Paris", "Example", "", CONTACT_EMAIL);

    // Submit the CSR and wait for the certificate to be issued.
    let cert = client
        .request_certificate(PRIMARY_NAME, &domain_key, &subject, DEFAULT_TIMEOUT)
        .await?;

    println!("{}", cert.pem());
    println!("valid for {} more days", cert.valid_days_left()?);

    // Stop temporary server for ACME challenge
    srv_handle.stop(true).await;
    srv_task.await??;

    // Delete acme-challenge dir
    fs::remove_dir_all("./acme-challenge")?;

    Ok(())
}
