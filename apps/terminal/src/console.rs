//! # Console Device Feed
//!
//! Line-oriented stand-in for the scanner, scale and keypad when the terminal
//! runs headless. Each line becomes one inbox command.
//!
//! ```text
//!  scan 1001                 add 1001 3              item 4.50 2 Gift wrap
//!  weigh 750                 cancel-weigh            remove <line-id>
//!  tender cash 50.00         confirm cash            clear card
//!  settle   cancel   hold   holds   resume H-0001   discard H-0001
//!  refund   refund off       refund 1001 12.00       refund-line <receipt> 2
//!  adjust <line-id> -1       totals   reload   help   quit
//! ```

use tally_core::events::{HardwareEvent, TenderKey};
use tally_core::{Money, PaymentMethod};
use tally_db::Database;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::error::TerminalResult;
use crate::inbox::{InboxHandle, OperatorCommand, TerminalEvent};
use crate::scale::ScaleFeed;

pub const HELP: &str = "\
scan <barcode>              scan an item (or refund it when refund is armed)
weigh <grams>               stable scale reading
cancel-weigh                abandon the open weigh request
add <code> [qty]            add units by barcode or product id
item <price> <qty> <name>   ad-hoc item
remove <line-id>            remove a line
adjust <line-id> <delta>    change a line quantity
tender <method> <amount>    stage a tender (cash, card, paynow, voucher)
confirm <method>            confirm the staged tender
clear <method>              clear a tender
settle | cancel | hold | holds | resume <id> | discard <id>
refund | refund off         arm / disarm refund-by-scan
refund <barcode> <amount>   manual refund
refund-line <receipt> <n>   refund line n of a settled receipt
totals | reload | help | quit";

/// One parsed console line.
#[derive(Debug, Clone)]
pub enum ConsoleInput {
    Hardware(HardwareEvent),
    Operator(OperatorCommand),
    /// Fed to the scale, not the inbox.
    Weigh(i64),
    /// Needs the sale looked up before it can reach the inbox.
    RefundReceiptLine { receipt_number: String, line: usize },
    ReloadCatalog,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Empty input")]
    Empty,

    #[error("Unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("'{command}' needs <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Invalid {argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
}

fn required<'a>(
    args: &[&'a str],
    index: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, ConsoleError> {
    args.get(index)
        .copied()
        .ok_or(ConsoleError::MissingArgument { command, argument })
}

fn parse_int(value: &str, argument: &'static str) -> Result<i64, ConsoleError> {
    value.parse().map_err(|_| ConsoleError::InvalidArgument {
        argument,
        reason: format!("'{}' is not a whole number", value),
    })
}

fn parse_money(value: &str) -> Result<Money, ConsoleError> {
    value.parse().map_err(|e| ConsoleError::InvalidArgument {
        argument: "amount",
        reason: format!("{}", e),
    })
}

fn parse_method(value: &str) -> Result<PaymentMethod, ConsoleError> {
    value.parse().map_err(|e| ConsoleError::InvalidArgument {
        argument: "method",
        reason: format!("{}", e),
    })
}

/// Parses one console line.
pub fn parse_line(line: &str) -> Result<ConsoleInput, ConsoleError> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or(ConsoleError::Empty)?.to_lowercase();
    let args: Vec<&str> = words.collect();

    let input = match command.as_str() {
        "scan" => ConsoleInput::Hardware(HardwareEvent::Scan(
            required(&args, 0, "scan", "barcode")?.to_string(),
        )),
        "weigh" => ConsoleInput::Weigh(parse_int(
            required(&args, 0, "weigh", "grams")?,
            "grams",
        )?),
        "cancel-weigh" => ConsoleInput::Operator(OperatorCommand::CancelWeigh),
        "add" => {
            let code = required(&args, 0, "add", "code")?.to_string();
            let quantity = match args.get(1) {
                Some(qty) => parse_int(qty, "quantity")?,
                None => 1,
            };
            ConsoleInput::Operator(OperatorCommand::AddItem { code, quantity })
        }
        "item" => {
            let unit_price = parse_money(required(&args, 0, "item", "price")?)?;
            let quantity = parse_int(required(&args, 1, "item", "qty")?, "quantity")?;
            if args.len() < 3 {
                return Err(ConsoleError::MissingArgument {
                    command: "item",
                    argument: "name",
                });
            }
            ConsoleInput::Operator(OperatorCommand::AddAdHoc {
                name: args[2..].join(" "),
                quantity,
                unit_price,
            })
        }
        "remove" => ConsoleInput::Operator(OperatorCommand::RemoveItem {
            line_id: required(&args, 0, "remove", "line-id")?.to_string(),
        }),
        "adjust" => ConsoleInput::Operator(OperatorCommand::AdjustQuantity {
            line_id: required(&args, 0, "adjust", "line-id")?.to_string(),
            delta: parse_int(required(&args, 1, "adjust", "delta")?, "delta")?,
        }),
        "tender" => ConsoleInput::Hardware(HardwareEvent::TenderKey(TenderKey::Propose {
            method: parse_method(required(&args, 0, "tender", "method")?)?,
            amount: parse_money(required(&args, 1, "tender", "amount")?)?,
        })),
        "confirm" => ConsoleInput::Hardware(HardwareEvent::TenderKey(TenderKey::Confirm {
            method: parse_method(required(&args, 0, "confirm", "method")?)?,
        })),
        "clear" => ConsoleInput::Hardware(HardwareEvent::TenderKey(TenderKey::Clear {
            method: parse_method(required(&args, 0, "clear", "method")?)?,
        })),
        "settle" => ConsoleInput::Operator(OperatorCommand::Settle),
        "cancel" => ConsoleInput::Operator(OperatorCommand::Cancel),
        "hold" => ConsoleInput::Operator(OperatorCommand::Hold),
        "holds" => ConsoleInput::Operator(OperatorCommand::ListHolds),
        "resume" => ConsoleInput::Operator(OperatorCommand::Resume {
            hold_id: required(&args, 0, "resume", "hold-id")?.to_string(),
        }),
        "discard" => ConsoleInput::Operator(OperatorCommand::DiscardHold {
            hold_id: required(&args, 0, "discard", "hold-id")?.to_string(),
        }),
        "refund" => match args.as_slice() {
            [] => ConsoleInput::Operator(OperatorCommand::ArmRefund),
            ["off"] => ConsoleInput::Operator(OperatorCommand::DisarmRefund),
            [barcode, amount] => ConsoleInput::Operator(OperatorCommand::RefundManual {
                barcode: barcode.to_string(),
                amount: parse_money(amount)?,
            }),
            _ => {
                return Err(ConsoleError::MissingArgument {
                    command: "refund",
                    argument: "amount",
                })
            }
        },
        "refund-line" => {
            let receipt_number = required(&args, 0, "refund-line", "receipt")?.to_string();
            let line = parse_int(required(&args, 1, "refund-line", "n")?, "line")?;
            if line < 1 {
                return Err(ConsoleError::InvalidArgument {
                    argument: "line",
                    reason: "lines are numbered from 1".to_string(),
                });
            }
            ConsoleInput::RefundReceiptLine {
                receipt_number,
                line: line as usize,
            }
        }
        "totals" => ConsoleInput::Operator(OperatorCommand::Totals),
        "reload" => ConsoleInput::ReloadCatalog,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };

    Ok(input)
}

/// One-line rendering of an inbox event. Totals are rendered by the caller
/// only when they changed.
pub fn describe(event: &TerminalEvent) -> String {
    match event {
        TerminalEvent::Totals(t) => format!(
            "[{:?}] lines {}  subtotal {}  tendered {}  due {}  change {}",
            t.state, t.line_count, t.subtotal, t.amount_tendered, t.balance_due, t.change_due
        ),
        TerminalEvent::LineAdded(line) => format!(
            "+ {}  {}  {:?}  {}",
            line.id,
            line.name,
            line.measure,
            line.line_total()
        ),
        TerminalEvent::LineRemoved { line_id } => format!("- {}", line_id),
        TerminalEvent::AwaitingWeight { barcode, name } => {
            format!("Place {} ({}) on the scale", name, barcode)
        }
        TerminalEvent::WeighCancelled => "Weigh cancelled".to_string(),
        TerminalEvent::Settled {
            receipt_number,
            total,
            change,
            stock_alerts,
        } => {
            let mut text = format!("Settled {}  total {}  change {}", receipt_number, total, change);
            for alert in stock_alerts {
                text.push_str(&format!(
                    "\n  low stock: {} ({}) {} left, threshold {}",
                    alert.name, alert.barcode, alert.remaining, alert.threshold
                ));
            }
            text
        }
        TerminalEvent::Warning { message } => format!("Warning: {}", message),
        TerminalEvent::Cancelled => "Sale cancelled".to_string(),
        TerminalEvent::Held { hold_id } => format!("Held as {}", hold_id),
        TerminalEvent::Holds(holds) if holds.is_empty() => "No holds".to_string(),
        TerminalEvent::Holds(holds) => holds
            .iter()
            .map(|h| {
                format!(
                    "{}  {}  {} lines  subtotal {}  tendered {}",
                    h.hold_id,
                    h.captured_at.format("%H:%M:%S"),
                    h.line_count,
                    h.subtotal,
                    h.amount_tendered
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        TerminalEvent::Resumed { hold_id } => format!("Resumed {}", hold_id),
        TerminalEvent::HoldDiscarded { hold_id } => format!("Discarded {}", hold_id),
        TerminalEvent::RefundArmed(true) => "Refund armed: scan the item".to_string(),
        TerminalEvent::RefundArmed(false) => "Refund disarmed".to_string(),
        TerminalEvent::Refunded(refund) => {
            format!("Refunded {}  {}", refund.description, refund.amount)
        }
        TerminalEvent::CatalogReloaded { products } => {
            format!("Catalog reloaded: {} products", products)
        }
        TerminalEvent::Rejected { kind, message } => format!("✗ {:?}: {}", kind, message),
    }
}

// =============================================================================
// Device Feed Loop
// =============================================================================

/// Reads commands from `input` until `quit` or end of input.
///
/// Weights go to the scale feed; receipt lookups and catalog reloads hit the
/// database before the inbox sees them. Parse errors are printed and skipped.
pub async fn drive<R>(
    input: R,
    inbox: &InboxHandle,
    scale: &ScaleFeed,
    db: &Database,
) -> TerminalResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let input = match parse_line(&line) {
            Ok(input) => input,
            Err(ConsoleError::Empty) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match input {
            ConsoleInput::Hardware(event) => inbox.hardware(event).await?,
            ConsoleInput::Operator(command) => inbox.operator(command).await?,
            ConsoleInput::Weigh(grams) => {
                if !scale.publish(grams) {
                    warn!(grams, "Scale is not listening");
                }
            }
            ConsoleInput::RefundReceiptLine {
                receipt_number,
                line,
            } => match db.sales().get_by_receipt(&receipt_number).await? {
                Some(transaction) => {
                    match transaction.lines.get(line - 1).map(|item| item.id.clone()) {
                        Some(line_id) => {
                            inbox
                                .operator(OperatorCommand::RefundLine {
                                    transaction: Box::new(transaction),
                                    line_id,
                                })
                                .await?
                        }
                        None => println!(
                            "Receipt {} has {} lines",
                            receipt_number,
                            transaction.lines.len()
                        ),
                    }
                }
                None => println!("No sale with receipt {}", receipt_number),
            },
            ConsoleInput::ReloadCatalog => {
                let products = db.products().load_catalog().await?;
                debug!(count = products.len(), "Catalog loaded for reload");
                inbox
                    .operator(OperatorCommand::ReloadCatalog(products))
                    .await?;
            }
            ConsoleInput::Help => println!("{}", HELP),
            ConsoleInput::Quit => break,
        }
    }

    info!("Console input closed");
    Ok(())
}
