//! GraphQL documents sent to the Monarch Money API.

/// Transaction fields selected by every query and mutation that returns one.
macro_rules! transaction_fields {
    () => {
        r"
fragment TransactionFields on Transaction {
  id
  date
  amount
  pending
  plaidName
  notes
  hideFromReports
  needsReview
  category { id name }
  merchant { id name }
  account { id displayName }
}
"
    };
}

/// Lists every account.
pub(crate) const GET_ACCOUNTS: &str = r"
query GetAccounts {
  accounts {
    id
    displayName
    currentBalance
    mask
    isHidden
    deactivatedAt
    updatedAt
    type { name display }
    subtype { name display }
    institution { name }
  }
}
";

/// Lists one page of transactions.
pub(crate) const GET_TRANSACTIONS: &str = concat!(
    r"
query GetTransactionsList($offset: Int, $limit: Int, $filters: TransactionFilterInput, $orderBy: TransactionOrdering) {
  allTransactions(filters: $filters) {
    totalCount
    results(offset: $offset, limit: $limit, orderBy: $orderBy) {
      ...TransactionFields
    }
  }
}
",
    transaction_fields!()
);

/// Budget amounts and category names for a date range.
pub(crate) const GET_BUDGETS: &str = r"
query GetJointPlanningData($startDate: Date!, $endDate: Date!) {
  budgetData(startMonth: $startDate, endMonth: $endDate) {
    monthlyAmountsByCategory {
      category { id }
      monthlyAmounts {
        month
        plannedCashFlowAmount
        actualAmount
        remainingAmount
      }
    }
  }
  categoryGroups {
    id
    name
    categories { id name }
  }
}
";

/// Income and expense aggregates for a date range.
pub(crate) const GET_CASHFLOW: &str = r#"
query Web_GetCashFlowPage($filters: TransactionFilterInput) {
  byCategory: aggregates(filters: $filters, groupBy: ["category"]) {
    groupBy {
      category { id name }
    }
    summary { sum }
  }
  summary: aggregates(filters: $filters, fillEmptyValues: true) {
    summary {
      sumIncome
      sumExpense
      savings
      savingsRate
    }
  }
}
"#;

/// Investment holdings of the given accounts.
pub(crate) const GET_HOLDINGS: &str = r"
query Web_GetHoldings($input: PortfolioInput) {
  portfolio(input: $input) {
    aggregateHoldings {
      edges {
        node {
          id
          quantity
          basis
          totalValue
          security {
            id
            name
            ticker
            currentPrice
            typeDisplay
          }
        }
      }
    }
  }
}
";

/// Creates a manual transaction.
pub(crate) const CREATE_TRANSACTION: &str = concat!(
    r"
mutation Common_CreateTransactionMutation($input: CreateTransactionMutationInput!) {
  createTransaction(input: $input) {
    errors {
      message
      fieldErrors { field messages }
    }
    transaction {
      ...TransactionFields
    }
  }
}
",
    transaction_fields!()
);

/// Updates fields of an existing transaction.
pub(crate) const UPDATE_TRANSACTION: &str = concat!(
    r"
mutation Web_TransactionDrawerUpdateTransaction($input: UpdateTransactionMutationInput!) {
  updateTransaction(input: $input) {
    errors {
      message
      fieldErrors { field messages }
    }
    transaction {
      ...TransactionFields
    }
  }
}
",
    transaction_fields!()
);

/// Asks Monarch to re-sync accounts with their institutions.
pub(crate) const REFRESH_ACCOUNTS: &str = r"
mutation Common_ForceRefreshAccountsMutation($input: ForceRefreshAccountsInput!) {
  forceRefreshAccounts(input: $input) {
    success
    errors {
      message
      fieldErrors { field messages }
    }
  }
}
";
