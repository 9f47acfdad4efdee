use fulfillment_engine::{
    db_types::{NewOrder, NewOrderLine, NewStock, Order, OrderLine, OrderNumber, Stock, VariantId, WarehouseId},
    FulfillmentDatabase,
    SqliteDatabase,
};
use wfe_common::Money;

pub const CURRENCY: &str = "USD";

pub fn warehouse() -> WarehouseId {
    WarehouseId::from("WH-MAIN")
}

/// One order line to seed: ordered quantity, unit price (minor units), and how much stock the
/// warehouse holds for its variant. The full ordered quantity is allocated against the stock,
/// capped at what the warehouse has.
#[derive(Debug, Clone, Copy)]
pub struct LineSpec {
    pub quantity: i64,
    pub unit_price: i64,
    pub stock_quantity: i64,
    pub gift_card: bool,
    pub preorder: bool,
}

impl LineSpec {
    pub fn new(quantity: i64, unit_price: i64) -> Self {
        Self { quantity, unit_price, stock_quantity: quantity, gift_card: false, preorder: false }
    }

    pub fn with_stock(mut self, stock_quantity: i64) -> Self {
        self.stock_quantity = stock_quantity;
        self
    }

    pub fn gift_card(mut self) -> Self {
        self.gift_card = true;
        self
    }

    pub fn preorder(mut self) -> Self {
        self.preorder = true;
        self
    }
}

pub struct SeededOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub stocks: Vec<Stock>,
}

/// Seeds an order with its lines, warehouse stock for every variant, and allocations reserving
/// the ordered quantities.
pub async fn seed_order(db: &SqliteDatabase, shipping_gross: i64, specs: &[LineSpec]) -> SeededOrder {
    let number = OrderNumber(format!("ORD{}", rand::random::<u32>()));
    let goods_total: i64 = specs.iter().map(|s| s.quantity * s.unit_price).sum();
    let total = Money::from(goods_total + shipping_gross);
    let new_order = NewOrder::new(number, CURRENCY, total, total)
        .with_shipping_price(Money::from(shipping_gross), Money::from(shipping_gross));
    let new_lines = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let variant = VariantId::from(format!("VAR-{}-{}", i, rand::random::<u32>()));
            let mut line =
                NewOrderLine::new(variant, &format!("Product {i}"), spec.quantity, Money::from(spec.unit_price))
                    .with_sku(&format!("SKU-{i}"));
            if spec.gift_card {
                line = line.gift_card();
            }
            if spec.preorder {
                line = line.preorder();
            }
            line
        })
        .collect();
    let (order, lines) = db.insert_order(new_order, new_lines).await.expect("Error seeding order");

    let mut stocks = Vec::with_capacity(specs.len());
    for (spec, line) in specs.iter().zip(lines.iter()) {
        let stock = db
            .upsert_stock(NewStock::new(warehouse(), line.variant_id.clone(), spec.stock_quantity))
            .await
            .expect("Error seeding stock");
        let reserve = spec.quantity.min(spec.stock_quantity);
        if reserve > 0 {
            db.allocate(line.id, stock.id, reserve, false).await.expect("Error allocating seeded stock");
        }
        stocks.push(stock);
    }
    SeededOrder { order, lines, stocks }
}
