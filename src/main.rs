#[tokio::main]
async fn main() {
    if let Err(e) = drink_menu_lib::run().await {
        eprintln!("drink-menu: {e}");
        std::process::exit(1);
    }
}
