//! # Seed Data Generator
//!
//! Loads a demo liquor catalog and an admin account for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p duka-db --bin seed
//! cargo run -p duka-db --bin seed -- --db ./data/duka.db --password s3cret
//! ```
//!
//! ## Generated Data
//! - One `admin` user (password from `--password`, default `admin123`)
//! - Every brand below in each of its sizes, priced per size
//! - Stock spread between 0 and 60 so the low-stock views have content

use anyhow::{anyhow, Context};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use chrono::Utc;
use duka_core::{Product, User, UserRole, DEFAULT_MAX_STOCK_LEVEL, DEFAULT_MIN_STOCK_LEVEL};
use duka_db::{Database, DbConfig};
use std::env;
use uuid::Uuid;

/// (category, [(brand, product name, base price in KES for 750ml)])
const CATALOG: &[(&str, &[(&str, &str, i64)])] = &[
    (
        "Whisky",
        &[
            ("Diageo", "Johnnie Walker Black Label", 4_500),
            ("Diageo", "Johnnie Walker Red Label", 2_400),
            ("Pernod Ricard", "Jameson Irish Whiskey", 2_800),
            ("Brown-Forman", "Jack Daniel's", 3_900),
            ("EABL", "Black & White", 1_300),
            ("Diageo", "VAT 69", 1_700),
        ],
    ),
    (
        "Vodka",
        &[
            ("Diageo", "Smirnoff Red", 1_450),
            ("Pernod Ricard", "Absolut", 2_300),
            ("EABL", "Chrome Vodka", 650),
            ("KWAL", "Kibao Vodka", 600),
        ],
    ),
    (
        "Gin",
        &[
            ("Diageo", "Gordon's London Dry", 2_200),
            ("KWAL", "Gilbey's Gin", 1_200),
            ("Diageo", "Tanqueray", 3_200),
            ("EABL", "Kenya King Gin", 650),
        ],
    ),
    (
        "Rum",
        &[
            ("Diageo", "Captain Morgan Spiced", 1_600),
            ("Bacardi", "Bacardi Carta Blanca", 2_000),
            ("EABL", "Kenya Cane", 800),
        ],
    ),
    (
        "Liqueur",
        &[
            ("Distell", "Amarula Cream", 2_100),
            ("Diageo", "Baileys Original", 2_700),
        ],
    ),
    (
        "Wine",
        &[
            ("Distell", "4th Street Sweet Red", 1_100),
            ("Distell", "Nederburg Cabernet", 1_600),
            ("Caprice", "Caprice Dry White", 900),
        ],
    ),
    (
        "Beer",
        &[
            ("EABL", "Tusker Lager", 250),
            ("EABL", "White Cap", 260),
            ("EABL", "Guinness", 280),
            ("KBL", "Heineken", 300),
        ],
    ),
];

/// (size label, price multiplier in percent of the 750ml price)
const SPIRIT_SIZES: &[(&str, i64)] = &[("250ml", 40), ("350ml", 52), ("750ml", 100), ("1L", 128)];
const BEER_SIZES: &[(&str, i64)] = &[("500ml", 100), ("6-Pack", 560)];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./duka_dev.db");
    let mut password = String::from("admin123");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Duka POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>         Database file path (default: ./duka_dev.db)");
                println!("  -p, --password <PASS>   Admin password (default: admin123)");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Duka POS Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {}", db_path))?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let admin = admin_user(&password)?;
    db.users().insert(&admin).await.context("inserting admin user")?;
    println!("✓ Created user 'admin'");

    let start = std::time::Instant::now();
    let mut generated = 0usize;

    for (category, products) in CATALOG {
        let sizes = if *category == "Beer" { BEER_SIZES } else { SPIRIT_SIZES };
        for (brand, name, base_kes) in products.iter() {
            for (size, percent) in sizes {
                let product = generate_product(category, brand, name, size, base_kes * percent, generated);
                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.name, e);
                    continue;
                }
                generated += 1;
            }
        }
    }

    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    let low = db.products().low_stock(100).await?;
    println!("  {} start at or below their minimum level", low.len());

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

fn admin_user(password: &str) -> anyhow::Result<User> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;

    let now = Utc::now();
    Ok(User {
        id: Uuid::new_v4().to_string(),
        username: "admin".to_string(),
        name: "Store Administrator".to_string(),
        email: None,
        password_hash: hash.to_string(),
        role: UserRole::Admin,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

/// Builds one product. `price_x100_kes` is the 750ml price × size percent.
fn generate_product(
    category: &str,
    brand: &str,
    name: &str,
    size: &str,
    price_x100_kes: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();

    // KES × percent / 100 × 100 cents = price_x100_kes cents, rounded to KES 10
    let price_cents = (price_x100_kes / 1_000).max(1) * 1_000;
    let cost_pct = 65 + (seed % 15) as i64;
    let stock = ((seed * 7) % 61) as i64;

    Product {
        id: Uuid::new_v4().to_string(),
        name: format!("{} {}", name, size),
        category: Some(category.to_string()),
        brand: Some(brand.to_string()),
        size: Some(size.to_string()),
        barcode: Some(format!("616{:010}", seed)),
        price_cents,
        cost_cents: price_cents * cost_pct / 100,
        stock,
        min_stock_level: DEFAULT_MIN_STOCK_LEVEL,
        max_stock_level: DEFAULT_MAX_STOCK_LEVEL,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
