//! Implements the `Drive` trait with in-memory spreadsheets for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Drive.
//!
//! Folders live in process-wide state keyed by folder ID. A folder ID that has never been installed
//! resolves to a seeded folder of sample monthly budgets.

use crate::api::{Drive, DriveError, DriveFile, TRANSACTIONS};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

/// `None` marks a folder that does not exist.
static FOLDERS: Lazy<Mutex<HashMap<String, Option<TestFolder>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A spreadsheet with named tabs of cell values.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TestSpreadsheet {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) tabs: Vec<(String, Vec<Vec<String>>)>,
}

impl TestSpreadsheet {
    pub(crate) fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tabs: Vec<(String, Vec<Vec<String>>)>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tabs,
        }
    }

    /// A spreadsheet with a Summary tab and a Transactions tab holding `grid`.
    pub(crate) fn budget(
        id: impl Into<String>,
        name: impl Into<String>,
        grid: Vec<Vec<String>>,
    ) -> Self {
        Self::new(
            id,
            name,
            vec![
                ("Summary".to_string(), Vec::new()),
                (TRANSACTIONS.to_string(), grid),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct TestFolder {
    pub(crate) spreadsheets: Vec<TestSpreadsheet>,
}

impl TestFolder {
    pub(crate) fn new(spreadsheets: Vec<TestSpreadsheet>) -> Self {
        Self { spreadsheets }
    }

    /// Stores this folder under a new random ID and returns the ID.
    #[cfg(test)]
    pub(crate) fn install(self) -> String {
        let id = format!("folder-{}", uuid::Uuid::new_v4().simple());
        TestDrive::set_folder(&id, self);
        id
    }

    /// Returns a new random folder ID that does not exist.
    #[cfg(test)]
    pub(crate) fn install_missing() -> String {
        let id = format!("missing-{}", uuid::Uuid::new_v4().simple());
        if let Ok(mut folders) = FOLDERS.lock() {
            folders.insert(id.clone(), None);
        }
        id
    }
}

/// An implementation of `Drive` backed by process-wide in-memory folders.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TestDrive;

impl TestDrive {
    pub(crate) fn new() -> Self {
        Self
    }

    /// Replaces the contents of the folder `folder_id`.
    #[cfg(test)]
    pub(crate) fn set_folder(folder_id: &str, folder: TestFolder) {
        if let Ok(mut folders) = FOLDERS.lock() {
            folders.insert(folder_id.to_string(), Some(folder));
        }
    }

    /// A copy of the folder `folder_id`.
    pub(crate) fn folder(folder_id: &str) -> Result<TestFolder, DriveError> {
        let folders = FOLDERS
            .lock()
            .map_err(|e| DriveError::Decode(format!("test drive state is poisoned: {e}")))?;
        match folders.get(folder_id) {
            Some(Some(folder)) => Ok(folder.clone()),
            Some(None) => Err(DriveError::NotFound(format!("folder {folder_id}"))),
            None => Ok(seed_folder()),
        }
    }

    fn spreadsheet(spreadsheet_id: &str) -> Result<TestSpreadsheet, DriveError> {
        let folders = FOLDERS
            .lock()
            .map_err(|e| DriveError::Decode(format!("test drive state is poisoned: {e}")))?;
        folders
            .values()
            .flatten()
            .cloned()
            .chain(std::iter::once(seed_folder()))
            .flat_map(|f| f.spreadsheets)
            .find(|s| s.id == spreadsheet_id)
            .ok_or_else(|| DriveError::NotFound(format!("spreadsheet {spreadsheet_id}")))
    }
}

#[async_trait::async_trait]
impl Drive for TestDrive {
    async fn list_spreadsheets(&mut self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        Ok(Self::folder(folder_id)?
            .spreadsheets
            .into_iter()
            .map(|s| DriveFile::new(s.id, s.name))
            .collect())
    }

    async fn sheet_names(&mut self, spreadsheet_id: &str) -> Result<Vec<String>, DriveError> {
        Ok(Self::spreadsheet(spreadsheet_id)?
            .tabs
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn values(
        &mut self,
        spreadsheet_id: &str,
        tab: &str,
    ) -> Result<Vec<Vec<String>>, DriveError> {
        Self::spreadsheet(spreadsheet_id)?
            .tabs
            .into_iter()
            .find(|(name, _)| name == tab)
            .map(|(_, grid)| grid)
            .ok_or_else(|| DriveError::NotFound(format!("tab '{tab}' of {spreadsheet_id}")))
    }
}

/// Lays out expense and income rows side by side the way the monthly budget template does:
/// a title row, a blank row, the header row and then the data. Each row is
/// `(date, amount, description, category)`.
pub(crate) fn budget_grid(
    expenses: &[(&str, &str, &str, &str)],
    income: &[(&str, &str, &str, &str)],
) -> Vec<Vec<String>> {
    let header = ["Date", "Amount", "Description", "Category"];
    let mut grid: Vec<Vec<String>> = vec![
        Vec::new(),
        vec!["", "Expenses", "", "", "", "", "Income"]
            .into_iter()
            .map(String::from)
            .collect(),
        Vec::new(),
    ];
    let mut header_row = vec![String::new()];
    header_row.extend(header.iter().map(|s| s.to_string()));
    header_row.push(String::new());
    header_row.extend(header.iter().map(|s| s.to_string()));
    grid.push(header_row);

    for i in 0..expenses.len().max(income.len()) {
        let mut row = vec![String::new()];
        match expenses.get(i) {
            Some((d, a, desc, c)) => row.extend([d, a, desc, c].map(|s| s.to_string())),
            None => row.extend(std::iter::repeat(String::new()).take(4)),
        }
        row.push(String::new());
        if let Some((d, a, desc, c)) = income.get(i) {
            row.extend([d, a, desc, c].map(|s| s.to_string()));
        }
        grid.push(row);
    }
    grid
}

/// A small but complete month: three expenses, one without a category, and two income rows.
pub(crate) fn sample_budget_grid() -> Vec<Vec<String>> {
    budget_grid(
        &[
            ("1/8/2025", "Rp15.000", "Snacks", "Food"),
            ("3/8/2025", "Rp153.700", "Groceries", "Food"),
            ("20/8/2025", "Rp20.000", "Parking", ""),
        ],
        &[
            ("1/8/2025", "Rp5.000.000", "Paycheck", "Salary"),
            ("15/8/2025", "Rp250.000", "Side project", "Freelance"),
        ],
    )
}

/// The folder every unknown folder ID resolves to.
fn seed_folder() -> TestFolder {
    TestFolder::new(vec![
        TestSpreadsheet::budget(
            "seed-2025-06",
            "Monthly budget Jun 2025",
            budget_grid(
                &[
                    ("2/6/2025", "Rp1.500.000", "Rent", "Housing"),
                    ("9/6/2025", "Rp350.000", "Groceries", "Food"),
                    ("21/6/2025", "Rp75.000", "Cinema", "Fun"),
                ],
                &[("1/6/2025", "Rp5.000.000", "Paycheck", "Salary")],
            ),
        ),
        TestSpreadsheet::budget(
            "seed-2025-07",
            "Monthly budget Jul 2025",
            budget_grid(
                &[
                    ("2/7/2025", "Rp1.500.000", "Rent", "Housing"),
                    ("12/7/2025", "Rp410.500", "Groceries", "Food"),
                    ("18/7/2025", "Rp60.000", "Taxi", ""),
                ],
                &[
                    ("1/7/2025", "Rp5.000.000", "Paycheck", "Salary"),
                    ("30/7/2025", "Rp400.000", "Sold a bike", ""),
                ],
            ),
        ),
        TestSpreadsheet::budget("seed-2025-08", "Monthly budget Aug 2025", sample_budget_grid()),
        TestSpreadsheet::budget("seed-template", "Monthly budget template", sample_budget_grid()),
        TestSpreadsheet::new("seed-notes", "Shopping notes", Vec::new()),
    ])
}
