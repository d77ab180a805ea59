use serde::{Deserialize, Serialize};

/// COCO 动物类别（bird ... giraffe）
pub const ANIMAL_CLASS_IDS: [i32; 10] = [14, 15, 16, 17, 18, 19, 20, 21, 22, 23];
pub const PERSON_CLASS_ID: i32 = 0;

/// 轴对齐包围盒，像素坐标 (x1, y1) - (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        self.x2 as i64 - self.x1 as i64
    }

    pub fn height(&self) -> i64 {
        self.y2 as i64 - self.y1 as i64
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Integer midpoint, floor division.
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x1 as i64 + self.x2 as i64).div_euclid(2),
            (self.y1 as i64 + self.y2 as i64).div_euclid(2),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Intersection-over-union. Boxes that do not overlap score 0.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1) as i64;
        let iy1 = self.y1.max(other.y1) as i64;
        let ix2 = self.x2.min(other.x2) as i64;
        let iy2 = self.y2.min(other.y2) as i64;

        let iw = ix2 - ix1;
        let ih = iy2 - iy1;
        if iw <= 0 || ih <= 0 {
            return 0.0;
        }

        let intersection = iw * ih;
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: i32,
    pub class_name: String,
    /// Producing model, or after consensus the sorted list of voting models
    pub model_source: String,
}

impl Detection {
    pub fn new(
        bbox: BoundingBox,
        confidence: f32,
        class_id: i32,
        class_name: impl Into<String>,
        model_source: impl Into<String>,
    ) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.into(),
            model_source: model_source.into(),
        }
    }

    pub fn category(&self) -> Category {
        Category::from_class_id(self.class_id)
    }

    /// area × confidence
    pub fn subject_score(&self) -> f64 {
        self.bbox.area() as f64 * self.confidence as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Person,
    Animal,
    Object,
}

impl Category {
    /// Enumeration order used for tie-breaking in subject selection.
    pub const ALL: [Category; 3] = [Category::Person, Category::Animal, Category::Object];

    pub fn from_class_id(class_id: i32) -> Self {
        if class_id == PERSON_CLASS_ID {
            Category::Person
        } else if ANIMAL_CLASS_IDS.contains(&class_id) {
            Category::Animal
        } else {
            Category::Object
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Animal => "animal",
            Category::Object => "object",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Person => "persons",
            Category::Animal => "animals",
            Category::Object => "objects",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 按类别分桶的检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedDetections {
    pub persons: Vec<Detection>,
    pub animals: Vec<Detection>,
    pub objects: Vec<Detection>,
}

impl CategorizedDetections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_detections<I>(detections: I) -> Self
    where
        I: IntoIterator<Item = Detection>,
    {
        let mut categorized = Self::new();
        for det in detections {
            categorized.push(det);
        }
        categorized
    }

    pub fn push(&mut self, detection: Detection) {
        match detection.category() {
            Category::Person => self.persons.push(detection),
            Category::Animal => self.animals.push(detection),
            Category::Object => self.objects.push(detection),
        }
    }

    pub fn get(&self, category: Category) -> &[Detection] {
        match category {
            Category::Person => &self.persons,
            Category::Animal => &self.animals,
            Category::Object => &self.objects,
        }
    }

    /// Person, then animal, then object; list order within a category.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Detection)> {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.get(c).iter().map(move |d| (c, d)))
    }

    pub fn len(&self) -> usize {
        self.persons.len() + self.animals.len() + self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
