//! # Seed Data Generator
//!
//! Populates the database with a development catalog.
//!
//! ## Usage
//! ```bash
//! # Generate the default catalog (200 unit items + weighed produce)
//! cargo run -p tally-db --bin seed
//!
//! # Generate custom amount of unit items
//! cargo run -p tally-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Products
//! - Unit items across a few grocery aisles, barcode `880{seed:010}`
//! - Weighed produce (price per kg, stock in grams), barcode `2{seed:04}`
//!
//! Each product has a cost and a markup; the selling price is derived from
//! them. Stock and low-stock thresholds vary so alerts show up quickly.

use std::env;
use tally_core::Product;
use tally_db::{Database, DbConfig};

/// Unit-sold product families.
const AISLES: &[(&str, &[&str])] = &[
    (
        "Beverages",
        &[
            "Cola", "Lemon Soda", "Green Tea", "Barley Drink", "Soy Milk",
            "Mineral Water", "Orange Juice", "Coffee Can", "Chrysanthemum Tea", "Isotonic",
        ],
    ),
    (
        "Pantry",
        &[
            "Jasmine Rice", "Instant Noodles", "Soy Sauce", "Oyster Sauce", "Sesame Oil",
            "Canned Tuna", "Canned Sardines", "Plain Flour", "White Sugar", "Sea Salt",
        ],
    ),
    (
        "Snacks",
        &[
            "Prawn Crackers", "Potato Chips", "Chocolate Bar", "Butter Cookies", "Peanuts",
            "Seaweed Snack", "Pineapple Tarts", "Gummies", "Wafer Rolls", "Rice Crackers",
        ],
    ),
    (
        "Household",
        &[
            "Dish Soap", "Laundry Powder", "Tissue Box", "Kitchen Towel", "Garbage Bags",
            "Toothpaste", "Shampoo", "Hand Soap", "Sponges", "Aluminium Foil",
        ],
    ),
];

const SIZES: &[(&str, i64)] = &[("Small", 0), ("Regular", 60), ("Large", 150), ("Family", 320), ("Bulk", 700)];

/// Weighed produce: name, cost per kg in cents.
const PRODUCE: &[(&str, i64)] = &[
    ("Red Grapes", 720),
    ("Bananas", 180),
    ("Fuji Apples", 420),
    ("Tomatoes", 260),
    ("Potatoes", 140),
    ("Garlic", 560),
    ("Ginger", 480),
    ("Chicken Thigh", 840),
    ("Pork Belly", 1260),
    ("Prawns", 2100),
];

/// Markups in basis points.
const MARKUPS: &[u32] = &[1500, 2500, 3500, 5000];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of unit items to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database:   {}", db_path);
    println!("Unit items: {}", count);
    println!("Produce:    {}", PRODUCE.len());
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let start = std::time::Instant::now();
    let mut generated = 0;

    'aisles: for (aisle_idx, (_aisle, names)) in AISLES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, cost_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'aisles;
                }

                let seed = aisle_idx * 1000 + name_idx * 10 + size_idx;
                let product = unit_product(name, size, *cost_addon, seed);

                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.barcode, e);
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} unit items...", generated);
                }
            }
        }
    }

    for (seed, (name, cost_per_kg)) in PRODUCE.iter().enumerate() {
        let product = produce(name, *cost_per_kg, seed);
        if let Err(e) = db.products().insert(&product).await {
            eprintln!("Failed to insert {}: {}", product.barcode, e);
            continue;
        }
        generated += 1;
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);

    // Verify the catalog loads the way the terminal will load it
    let catalog = db.products().load_catalog().await?;
    let weighed = catalog.iter().filter(|p| p.sold_by_weight).count();
    println!("  Catalog: {} active, {} sold by weight", catalog.len(), weighed);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn unit_product(name: &str, size: &str, cost_addon: i64, seed: usize) -> Product {
    // Cost $0.80 - $6.79 + size addon
    let cost_cents = 80 + ((seed * 37) % 600) as i64 + cost_addon;
    let markup = MARKUPS[seed % MARKUPS.len()];

    // Stock 0-60, threshold 5 or 10
    let stock = (seed % 61) as i64;
    let threshold = if seed % 2 == 0 { 5 } else { 10 };

    Product::new(format!("880{:010}", seed), format!("{} {}", name, size), cost_cents, markup)
        .with_stock(stock, threshold)
}

fn produce(name: &str, cost_per_kg: i64, seed: usize) -> Product {
    let markup = MARKUPS[seed % MARKUPS.len()];

    // 2-20 kg on hand, alert under 1.5 kg
    let grams = 2_000 + (seed as i64 * 1_800);

    Product::new(format!("2{:04}", seed), name, cost_per_kg, markup)
        .by_weight()
        .with_stock(grams, 1_500)
}
