//! 两两相似度计算与抄袭小组聚类
//!
//! 纯函数：不做 IO、不加锁，相同输入必然得到相同输出。

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::config::validate_threshold;
use crate::error::ConfigError;
use crate::models::{GradingArtifact, PlagiarismGroup, SimilarityPair, SimilarityReport, StudentIdentity};
use crate::similarity::tokenizer::tokenize;

/// 连续多少个词法单元组成一个 shingle
pub const SHINGLE_SIZE: usize = 3;

/// 一份提交规范化后的指纹
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// 整份提交（按路径顺序拼接）的 shingle 哈希集合
    shingles: HashSet<u64>,
    /// 每个文件的词法单元序列哈希，空文件不记录
    files: BTreeMap<String, u64>,
}

impl Fingerprint {
    pub fn of(artifact: &GradingArtifact) -> Self {
        let mut tokens = Vec::new();
        let mut files = BTreeMap::new();

        for (path, content) in artifact.files() {
            let file_tokens = tokenize(path, content);
            if file_tokens.is_empty() {
                continue;
            }
            files.insert(path.to_string(), hash_of(&file_tokens));
            tokens.extend(file_tokens);
        }

        Self {
            shingles: shingles(&tokens),
            files,
        }
    }

    /// 规范化后没有任何词法单元
    pub fn is_empty(&self) -> bool {
        self.shingles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shingles.len()
    }

    /// 与另一份指纹的 Jaccard 相似度
    pub fn jaccard(&self, other: &Self) -> f64 {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }
        let (small, large) = if self.len() <= other.len() {
            (&self.shingles, &other.shingles)
        } else {
            (&other.shingles, &self.shingles)
        };
        let intersection = small.iter().filter(|s| large.contains(s)).count();
        let union = self.len() + other.len() - intersection;
        intersection as f64 / union as f64
    }

    /// 两边都有且规范化后内容完全相同的文件，按路径排序
    pub fn shared_files(&self, other: &Self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(path, hash)| other.files.get(*path) == Some(*hash))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn shingles(tokens: &[&str]) -> HashSet<u64> {
    if tokens.is_empty() {
        return HashSet::new();
    }
    if tokens.len() < SHINGLE_SIZE {
        return HashSet::from([hash_of(tokens)]);
    }
    tokens.windows(SHINGLE_SIZE).map(hash_of).collect()
}

/// 两份提交的相似度，取值 [0, 1]，规范化后完全相同时为 1.0
pub fn score(a: &GradingArtifact, b: &GradingArtifact) -> f64 {
    Fingerprint::of(a).jaccard(&Fingerprint::of(b))
}

/// 全量两两比对并聚类
///
/// - `artifacts` 只应包含流水线成功的学生
/// - 规范化后为空的提交不参与比对
/// - 只报告相似度不低于 `threshold` 的配对；孤立的学生不成组
pub fn analyze(
    artifacts: BTreeMap<StudentIdentity, GradingArtifact>,
    threshold: f64,
) -> Result<SimilarityReport, ConfigError> {
    validate_threshold(threshold)?;

    let entries: Vec<(StudentIdentity, Fingerprint)> = artifacts
        .into_iter()
        .map(|(identity, artifact)| (identity, Fingerprint::of(&artifact)))
        .filter(|(_, fingerprint)| !fingerprint.is_empty())
        .collect();

    let mut edges: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let (a, b) = (&entries[i].1, &entries[j].1);

            // Jaccard 不会超过集合大小之比，比值不够的配对可以直接跳过
            let ratio = a.len().min(b.len()) as f64 / a.len().max(b.len()) as f64;
            if ratio < threshold {
                continue;
            }

            let similarity = a.jaccard(b);
            if similarity >= threshold {
                edges.push((i, j, similarity));
            }
        }
    }

    let mut pairs: Vec<SimilarityPair> = edges
        .iter()
        .map(|&(i, j, similarity)| SimilarityPair {
            a: entries[i].0.clone(),
            b: entries[j].0.clone(),
            score: similarity,
            shared_files: entries[i].1.shared_files(&entries[j].1),
        })
        .collect();
    pairs.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| x.a.cmp(&y.a))
            .then_with(|| x.b.cmp(&y.b))
    });

    let groups = cluster(&entries, &edges);
    Ok(SimilarityReport { pairs, groups })
}

/// 连通分量即抄袭小组
fn cluster(entries: &[(StudentIdentity, Fingerprint)], edges: &[(usize, usize, f64)]) -> Vec<PlagiarismGroup> {
    let mut sets = DisjointSet::new(entries.len());
    for &(i, j, _) in edges {
        sets.union(i, j);
    }

    // 根节点 → (成员下标, 组内最高相似度)
    let mut components: BTreeMap<usize, (Vec<usize>, f64)> = BTreeMap::new();
    for &(i, j, similarity) in edges {
        let component = components.entry(sets.find(i)).or_insert_with(|| (Vec::new(), 0.0));
        component.0.extend([i, j]);
        component.1 = component.1.max(similarity);
    }

    let mut groups: Vec<PlagiarismGroup> = components
        .into_values()
        .map(|(mut members, peak_score)| {
            // entries 按标识有序，下标有序即成员有序
            members.sort_unstable();
            members.dedup();
            PlagiarismGroup {
                members: members.into_iter().map(|m| entries[m].0.clone()).collect(),
                peak_score,
            }
        })
        .collect();
    groups.sort_by(|x, y| x.members.first().cmp(&y.members.first()));
    groups
}

/// 并查集（路径压缩 + 按秩合并）
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(files: &[(&str, &str)]) -> GradingArtifact {
        files.iter().copied().collect()
    }

    #[test]
    fn identical_after_whitespace_and_comments_scores_one() {
        let a = artifact(&[("main.py", "x = 1\ny = x + 2  # add\nprint(y)")]);
        let b = artifact(&[("main.py", "x=1\n\n\ny=x+2\nprint( y )")]);
        assert_eq!(score(&a, &b), 1.0);
    }

    #[test]
    fn score_is_symmetric_and_bounded() {
        let a = artifact(&[("a.py", "def add(a, b):\n    return a + b\n")]);
        let b = artifact(&[("b.py", "def mul(a, b):\n    return a * b\n")]);
        let ab = score(&a, &b);
        assert_eq!(ab, score(&b, &a));
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn empty_artifacts() {
        let empty = artifact(&[("notes.py", "   \n# just a comment\n")]);
        let code = artifact(&[("main.py", "print(1)")]);
        assert_eq!(score(&empty, &GradingArtifact::new()), 1.0);
        assert_eq!(score(&empty, &code), 0.0);
    }

    #[test]
    fn floor_division_is_not_treated_as_comment() {
        let a = artifact(&[("main.py", "return sum(xs) // len(xs) + bonus(xs) * weight")]);
        let b = artifact(&[("main.py", "return sum(xs) // 3")]);
        assert!(score(&a, &b) < 1.0);
    }

    #[test]
    fn comment_syntax_follows_each_file() {
        // 同一份文本：在 .c 里 `//` 后面是注释，在 .py 里是代码
        let c = artifact(&[("calc.c", "x = a // b + c")]);
        let c_stripped = artifact(&[("calc.c", "x = a")]);
        let py = artifact(&[("calc.py", "x = a // b + c")]);
        assert_eq!(score(&c, &c_stripped), 1.0);
        assert!(score(&py, &artifact(&[("calc.py", "x = a")])) < 1.0);
    }

    #[test]
    fn short_sequences_form_a_single_shingle() {
        let a = artifact(&[("a.py", "x y")]);
        let b = artifact(&[("b.py", "x y")]);
        let c = artifact(&[("c.py", "y x")]);
        assert_eq!(score(&a, &b), 1.0);
        assert_eq!(score(&a, &c), 0.0);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        for threshold in [-0.1, 1.5, f64::NAN] {
            let err = analyze(BTreeMap::new(), threshold).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidThreshold(_)));
        }
    }

    #[test]
    fn shared_files_lists_identical_paths() {
        let a = Fingerprint::of(&artifact(&[("main.py", "a = 1"), ("util.py", "b = 2")]));
        let b = Fingerprint::of(&artifact(&[("main.py", "a  =  1 # same"), ("util.py", "b = 3")]));
        assert_eq!(a.shared_files(&b), vec!["main.py".to_string()]);
    }

    #[test]
    fn disjoint_set_merges_components() {
        let mut sets = DisjointSet::new(5);
        sets.union(0, 1);
        sets.union(3, 4);
        sets.union(1, 4);
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(2), sets.find(0));
    }
}
