// 📊 Analysis - summaries over stored records for the presentation layer

use crate::entities::{Product, Student};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SALES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category: String,
    pub sales: f64,
    pub products: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    /// Σ price_in_inr × quantity
    pub total_sales: f64,
    pub total_products: usize,
    pub avg_sales_per_product: f64,
    pub top_selling: Option<Product>,
    /// Highest sales first
    pub by_category: Vec<CategorySales>,
}

impl SalesSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} products, total sales ₹{:.2}, avg ₹{:.2}/product, top: {}",
            self.total_products,
            self.total_sales,
            self.avg_sales_per_product,
            self.top_selling
                .as_ref()
                .map(|p| p.product_name.as_str())
                .unwrap_or("-")
        )
    }
}

pub fn sales_summary(products: &[Product]) -> SalesSummary {
    let total_sales: f64 = products.iter().map(Product::sales_value).sum();
    let total_products = products.len();

    let avg_sales_per_product = if total_products > 0 {
        total_sales / total_products as f64
    } else {
        0.0
    };

    // First product wins ties
    let top_selling = products
        .iter()
        .fold(None::<&Product>, |best, p| match best {
            Some(b) if b.sales_value() >= p.sales_value() => Some(b),
            _ => Some(p),
        })
        .cloned();

    let mut categories: HashMap<&str, (f64, usize)> = HashMap::new();
    for p in products {
        let entry = categories.entry(p.category.as_str()).or_insert((0.0, 0));
        entry.0 += p.sales_value();
        entry.1 += 1;
    }

    let mut by_category: Vec<CategorySales> = categories
        .into_iter()
        .map(|(category, (sales, products))| CategorySales {
            category: category.to_string(),
            sales,
            products,
        })
        .collect();
    by_category.sort_by(|a, b| {
        b.sales
            .partial_cmp(&a.sales)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });

    SalesSummary {
        total_sales,
        total_products,
        avg_sales_per_product,
        top_selling,
        by_category,
    }
}

// ============================================================================
// STUDENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub total_students: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub average_gpa: f64,
    pub average_mid: f64,
    pub top_student: Option<Student>,
}

impl StudentSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} students: {} pass, {} fail ({:.1}% pass), avg GPA {:.2}, avg mid {:.2}",
            self.total_students,
            self.passed,
            self.failed,
            self.pass_rate * 100.0,
            self.average_gpa,
            self.average_mid
        )
    }
}

pub fn student_summary(students: &[Student]) -> StudentSummary {
    let total = students.len();
    let passed = students.iter().filter(|s| s.passed()).count();
    let mean = |f: fn(&Student) -> f64| {
        if total == 0 {
            0.0
        } else {
            students.iter().map(f).sum::<f64>() / total as f64
        }
    };

    let top_student = students
        .iter()
        .fold(None::<&Student>, |best, s| match best {
            Some(b) if b.gpa >= s.gpa => Some(b),
            _ => Some(s),
        })
        .cloned();

    StudentSummary {
        total_students: total,
        passed,
        failed: total - passed,
        pass_rate: if total == 0 { 0.0 } else { passed as f64 / total as f64 },
        average_gpa: mean(|s| s.gpa),
        average_mid: mean(|s| s.mid_avg),
        top_student,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PriceCategory, ResultStatus};

    fn product(pid: &str, category: &str, price_in_inr: f64, quantity: i64) -> Product {
        Product {
            pid: pid.to_string(),
            product_name: format!("Item {}", pid),
            category: category.to_string(),
            price_in_dollar: price_in_inr / 83.0,
            price_in_inr,
            price_category: PriceCategory::Cheap,
            quantity,
            return_rate: 1.0,
            uid: "U1".to_string(),
            user_name: "Kiran".to_string(),
            branch: "Goa".to_string(),
        }
    }

    fn student(sid: &str, gpa: f64, mid_avg: f64) -> Student {
        Student {
            sid: sid.to_string(),
            name: sid.to_string(),
            mid1: mid_avg,
            mid2: mid_avg,
            mid_avg,
            semester: 60.0,
            gpa,
            percentage: gpa * 10.0,
            status: if gpa <= 6.0 {
                ResultStatus::Fail
            } else {
                ResultStatus::Pass
            },
        }
    }

    #[test]
    fn test_sales_summary() {
        let products = vec![
            product("P1", "Books", 100.0, 2),
            product("P2", "Toys", 50.0, 10),
            product("P3", "Books", 300.0, 1),
        ];

        let summary = sales_summary(&products);

        assert_eq!(summary.total_sales, 1000.0);
        assert_eq!(summary.total_products, 3);
        assert!((summary.avg_sales_per_product - 1000.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.top_selling.unwrap().pid, "P2");
        assert_eq!(summary.by_category[0].category, "Books");
        assert_eq!(summary.by_category[0].sales, 500.0);
        assert_eq!(summary.by_category[0].products, 2);
    }

    #[test]
    fn test_empty_sales_summary() {
        let summary = sales_summary(&[]);
        assert_eq!(summary.avg_sales_per_product, 0.0);
        assert!(summary.top_selling.is_none());
        assert!(summary.by_category.is_empty());
    }

    #[test]
    fn test_student_summary() {
        let students = vec![
            student("S1", 8.0, 30.0),
            student("S2", 5.0, 20.0),
            student("S3", 9.0, 40.0),
            student("S4", 6.0, 10.0),
        ];

        let summary = student_summary(&students);

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.pass_rate, 0.5);
        assert_eq!(summary.average_gpa, 7.0);
        assert_eq!(summary.average_mid, 25.0);
        assert_eq!(summary.top_student.unwrap().sid, "S3");
        assert!(!student_summary(&[]).summary().is_empty());
    }
}
