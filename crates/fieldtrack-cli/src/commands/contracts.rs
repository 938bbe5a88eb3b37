use fieldtrack_core::api::import_checked_in;
use fieldtrack_core::Contract;

use crate::app::App;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn row(contract: &Contract) -> String {
    let status = if contract.is_checked_in() {
        "checked in"
    } else {
        "pending"
    };
    let overdue = contract.amount_overdue.as_deref().unwrap_or("-");
    format!(
        "{:<16} {:<32} {:>14}  {status}",
        contract.lease_no, contract.customer_name, overdue
    )
}

/// List assigned contracts and pull server-side check-ins into the log.
pub async fn list(json: bool) -> CmdResult {
    let app = App::open(None).await.map_err(|e| e.user_message())?;
    let employee = app.employee_id().to_string();
    let contracts = app
        .client
        .fetch_contracts(&employee)
        .await?;
    let imported = import_checked_in(app.scheduler.engine().event_log(), &employee, &contracts).await?;

    if json {
        let rows: Vec<serde_json::Value> = contracts
            .iter()
            .map(|c| {
                serde_json::json!({
                    "leaseNo": c.lease_no,
                    "customer": c.customer_name,
                    "address": c.customer_address,
                    "amountOverdue": c.amount_overdue,
                    "dueDate": c.due_date,
                    "checkedIn": c.is_checked_in(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if contracts.is_empty() {
        println!("No contracts assigned.");
        return Ok(());
    }
    println!("{:<16} {:<32} {:>14}  STATUS", "LEASE", "CUSTOMER", "OVERDUE");
    for contract in &contracts {
        println!("{}", row(contract));
    }
    if imported > 0 {
        println!("{imported} server check-in(s) added to the local log");
    }
    Ok(())
}

/// Replace the visit comment on a checked-in contract.
pub async fn comment(lease_no: &str, text: &str) -> CmdResult {
    if text.trim().is_empty() {
        return Err("comment must not be empty".into());
    }
    let app = App::open(None).await.map_err(|e| e.user_message())?;
    let receipt = app
        .client
        .update_comment(app.employee_id(), lease_no, text)
        .await?;
    if !receipt.ok {
        return Err(format!(
            "server rejected the comment (status {}): {}",
            receipt.server_status, receipt.server_message
        )
        .into());
    }
    println!("Comment updated for {lease_no}");
    Ok(())
}
